//! Voice presence tracking.

use std::collections::HashMap;
use std::sync::RwLock;
use yomi_types::{ChannelId, GuildId, UserId};

/// One user's current voice connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceMember {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub bot: bool,
}

/// Read and update access to the voice states of every guild.
pub trait VoiceStateCache: Send + Sync {
    fn voice_states(&self, guild: GuildId) -> Vec<VoiceMember>;

    /// Records that `user` is now in `channel`, or disconnected when `None`.
    fn apply(&self, guild: GuildId, user: UserId, bot: bool, channel: Option<ChannelId>);
}

/// In-memory [`VoiceStateCache`] fed from voice state events.
#[derive(Debug, Default)]
pub struct VoiceStates {
    guilds: RwLock<HashMap<GuildId, HashMap<UserId, VoiceMember>>>,
}

impl VoiceStates {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VoiceStateCache for VoiceStates {
    fn voice_states(&self, guild: GuildId) -> Vec<VoiceMember> {
        let guilds = match self.guilds.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guilds
            .get(&guild)
            .map(|members| members.values().copied().collect())
            .unwrap_or_default()
    }

    fn apply(&self, guild: GuildId, user: UserId, bot: bool, channel: Option<ChannelId>) {
        let mut guilds = match self.guilds.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match channel {
            Some(channel_id) => {
                guilds.entry(guild).or_default().insert(
                    user,
                    VoiceMember {
                        user_id: user,
                        channel_id,
                        bot,
                    },
                );
            }
            None => {
                if let Some(members) = guilds.get_mut(&guild) {
                    members.remove(&user);
                    if members.is_empty() {
                        guilds.remove(&guild);
                    }
                }
            }
        }
    }
}

/// True when no human besides `ignored` remains in `channel`.
pub fn is_voice_channel_empty(
    cache: &dyn VoiceStateCache,
    guild: GuildId,
    channel: ChannelId,
    ignored: Option<UserId>,
) -> bool {
    !cache.voice_states(guild).iter().any(|m| {
        m.channel_id == channel && !m.bot && Some(m.user_id) != ignored
    })
}
