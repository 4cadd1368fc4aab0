//! Index of live sessions by voice and reading channel.

use crate::error::RouterError;
use crate::event::{Member, PlatformEvent};
use crate::presence::{is_voice_channel_empty, VoiceStateCache};
use crate::session::Session;
use crate::state::SessionState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use yomi_types::{ChannelId, GuildId};

/// Receives session lifecycle notifications from the router.
///
/// Callbacks run inline while the router lock is held. They must return
/// quickly and must not call back into the router.
pub trait SessionObserver: Send + Sync {
    fn on_created(&self, state: &SessionState);
    fn on_deleted(&self, state: &SessionState);
}

#[derive(Default)]
struct Index {
    by_voice: HashMap<ChannelId, Arc<Session>>,
    reading_to_voice: HashMap<ChannelId, ChannelId>,
    observers: Vec<Arc<dyn SessionObserver>>,
}

pub struct SessionRouter {
    index: Mutex<Index>,
    presence: Arc<dyn VoiceStateCache>,
}

impl SessionRouter {
    pub fn new(presence: Arc<dyn VoiceStateCache>) -> Self {
        Self {
            index: Mutex::new(Index::default()),
            presence,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Index> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn presence(&self) -> &Arc<dyn VoiceStateCache> {
        &self.presence
    }

    /// Registers a session. Fails if either of its channels is taken.
    pub fn add(&self, session: Arc<Session>) -> Result<(), RouterError> {
        let state = session.state();
        let mut index = self.lock();
        if index.by_voice.contains_key(&state.voice_channel_id) {
            return Err(RouterError::VoiceChannelBound(state.voice_channel_id));
        }
        if index.reading_to_voice.contains_key(&state.reading_channel_id) {
            return Err(RouterError::ReadingChannelBound(state.reading_channel_id));
        }
        index.by_voice.insert(state.voice_channel_id, session);
        index
            .reading_to_voice
            .insert(state.reading_channel_id, state.voice_channel_id);
        for observer in &index.observers {
            observer.on_created(&state);
        }
        Ok(())
    }

    /// Removes the session bound to `voice`. Observers hear about it only
    /// if there was one.
    pub fn delete(&self, voice: ChannelId) -> Option<Arc<Session>> {
        let mut index = self.lock();
        let session = index.by_voice.remove(&voice)?;
        let state = session.state();
        index.reading_to_voice.remove(&state.reading_channel_id);
        for observer in &index.observers {
            observer.on_deleted(&state);
        }
        Some(session)
    }

    pub fn get_by_voice(&self, voice: ChannelId) -> Option<Arc<Session>> {
        self.lock().by_voice.get(&voice).cloned()
    }

    pub fn get_by_reading(&self, reading: ChannelId) -> Option<Arc<Session>> {
        let index = self.lock();
        let voice = index.reading_to_voice.get(&reading)?;
        index.by_voice.get(voice).cloned()
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.lock().by_voice.values().cloned().collect()
    }

    /// States of all live sessions, ordered by voice channel.
    pub fn states(&self) -> Vec<SessionState> {
        let mut states: Vec<_> = self.lock().by_voice.values().map(|s| s.state()).collect();
        states.sort_by_key(|s| s.voice_channel_id);
        states
    }

    pub fn len(&self) -> usize {
        self.lock().by_voice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.lock().observers.push(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn SessionObserver>) {
        let target = Arc::as_ptr(observer) as *const ();
        self.lock()
            .observers
            .retain(|o| Arc::as_ptr(o) as *const () != target);
    }

    /// Routes a platform event to the session it concerns.
    pub async fn dispatch(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::MessageCreated(message) => {
                let Some(session) = self.get_by_reading(message.channel_id) else {
                    return;
                };
                if let Err(e) = session.on_message(&message).await {
                    tracing::warn!(
                        reading_channel_id = %message.channel_id,
                        error = %e,
                        "message not queued"
                    );
                }
            }
            PlatformEvent::VoiceStateUpdate {
                guild_id,
                member,
                before,
                after,
            } => {
                self.presence.apply(guild_id, member.id, member.bot, after);
                if before == after {
                    return;
                }
                // A move is a leave followed by a join.
                if let Some(channel) = before {
                    self.handle_leave(guild_id, channel, &member).await;
                }
                if let Some(channel) = after {
                    self.handle_join(guild_id, channel, &member).await;
                }
            }
        }
    }

    async fn handle_join(&self, guild: GuildId, channel: ChannelId, member: &Member) {
        let Some(session) = self.get_by_voice(channel) else {
            return;
        };
        if session.guild_id() != guild {
            return;
        }
        if let Err(e) = session.on_user_join(member).await {
            tracing::warn!(voice_channel_id = %channel, error = %e, "join announcement not queued");
        }
    }

    async fn handle_leave(&self, guild: GuildId, channel: ChannelId, member: &Member) {
        let Some(session) = self.get_by_voice(channel) else {
            return;
        };
        if session.guild_id() != guild {
            return;
        }

        if is_voice_channel_empty(self.presence.as_ref(), guild, channel, Some(member.id)) {
            tracing::info!(
                guild_id = %guild,
                voice_channel_id = %channel,
                "voice channel is empty, closing session"
            );
            if let Some(session) = self.delete(channel) {
                if let Err(e) = session.close().await {
                    tracing::warn!(voice_channel_id = %channel, error = %e, "failed to close session");
                }
            }
            return;
        }

        if let Err(e) = session.on_user_leave(member).await {
            tracing::warn!(voice_channel_id = %channel, error = %e, "leave announcement not queued");
        }
    }

    /// Closes every live session without removing it, so persisted
    /// leases outlive the process.
    pub async fn close_all(&self) {
        for session in self.sessions() {
            if let Err(e) = session.close().await {
                tracing::warn!(
                    voice_channel_id = %session.voice_channel_id(),
                    error = %e,
                    "failed to close session on shutdown"
                );
            }
        }
    }
}
