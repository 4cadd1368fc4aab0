//! A single voice session: task queue, worker, player and transport.

use crate::error::{EnqueueError, SessionError};
use crate::event::{Member, TextMessage};
use crate::message::{prepare_segments, Announcements, MessageRules};
use crate::player::{stopped, PlayerState, TrackPlayer};
use crate::state::SessionState;
use crate::task::SpeechTask;
use crate::transport::VoiceTransport;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use yomi_preset::PresetResolver;
use yomi_tts::EngineRegistry;
use yomi_types::{ChannelId, GuildId, SpeechRequest, SpeechResponse, UserId};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub task_queue_capacity: usize,
    /// Audio queue capacity is `task_queue_capacity * audio_queue_multiplier`.
    pub audio_queue_multiplier: usize,
    pub synthesis_timeout: Duration,
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            task_queue_capacity: 32,
            audio_queue_multiplier: 3,
            synthesis_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    pub fn audio_queue_capacity(&self) -> usize {
        self.task_queue_capacity
            .max(1)
            .saturating_mul(self.audio_queue_multiplier.max(1))
    }
}

/// Shared, read-only dependencies of every session.
pub struct SessionContext {
    pub engines: Arc<EngineRegistry>,
    pub resolver: Arc<PresetResolver>,
    pub rules: MessageRules,
    pub announcements: Announcements,
    pub config: SessionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Created,
    Active,
    Closing,
    Closed,
}

// Halves handed to the spawned loops on start.
struct Pending {
    tasks: mpsc::Receiver<SpeechTask>,
    audio: mpsc::Sender<SpeechResponse>,
    player: TrackPlayer,
}

pub struct Session {
    state: SessionState,
    ctx: Arc<SessionContext>,
    transport: Arc<dyn VoiceTransport>,
    tasks: mpsc::Sender<SpeechTask>,
    shutdown: watch::Sender<bool>,
    status: Mutex<SessionStatus>,
    pending: Mutex<Option<Pending>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    player_state: watch::Receiver<PlayerState>,
}

impl Session {
    /// Builds a session and registers its player with `transport`.
    ///
    /// Tasks may be enqueued right away; nothing is processed until
    /// [`Session::start`].
    pub fn new(
        state: SessionState,
        transport: Arc<dyn VoiceTransport>,
        ctx: Arc<SessionContext>,
    ) -> Self {
        let capacity = ctx.config.task_queue_capacity.max(1);
        let (task_tx, task_rx) = mpsc::channel(capacity);
        let (audio_tx, audio_rx) = mpsc::channel(ctx.config.audio_queue_capacity());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let (player, source) = TrackPlayer::new(audio_rx, shutdown_rx);
        let player_state = player.subscribe();
        transport.set_frame_source(Box::new(source));

        Self {
            state,
            ctx,
            transport,
            tasks: task_tx,
            shutdown,
            status: Mutex::new(SessionStatus::Created),
            pending: Mutex::new(Some(Pending {
                tasks: task_rx,
                audio: audio_tx,
                player,
            })),
            handles: Mutex::new(Vec::new()),
            player_state,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn guild_id(&self) -> GuildId {
        self.state.guild_id
    }

    pub fn voice_channel_id(&self) -> ChannelId {
        self.state.voice_channel_id
    }

    pub fn reading_channel_id(&self) -> ChannelId {
        self.state.reading_channel_id
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn player_state(&self) -> PlayerState {
        *self.player_state.borrow()
    }

    pub fn transport(&self) -> &Arc<dyn VoiceTransport> {
        &self.transport
    }

    /// Spawns the worker and the player. Must be called inside a runtime.
    pub fn start(&self) -> Result<(), SessionError> {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        match *status {
            SessionStatus::Created => {}
            SessionStatus::Active => return Err(SessionError::AlreadyStarted),
            SessionStatus::Closing | SessionStatus::Closed => return Err(SessionError::Closed),
        }
        let Some(pending) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Err(SessionError::AlreadyStarted);
        };

        let worker = Worker {
            tasks: pending.tasks,
            audio: pending.audio,
            shutdown: self.shutdown.subscribe(),
            ctx: Arc::clone(&self.ctx),
            state: self.state,
            last_speaker: None,
        };
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.push(tokio::spawn(worker.run()));
        handles.push(tokio::spawn(pending.player.run()));
        *status = SessionStatus::Active;

        tracing::info!(
            guild_id = %self.state.guild_id,
            voice_channel_id = %self.state.voice_channel_id,
            reading_channel_id = %self.state.reading_channel_id,
            "session started"
        );
        Ok(())
    }

    /// Queues a task without waiting. A full queue rejects the task.
    pub fn enqueue_task(&self, task: SpeechTask) -> Result<(), EnqueueError> {
        if *self.shutdown.borrow() {
            return Err(EnqueueError::Stopped);
        }
        match self.tasks.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    guild_id = %self.state.guild_id,
                    voice_channel_id = %self.state.voice_channel_id,
                    "task queue saturated, dropping task"
                );
                Err(EnqueueError::Saturated)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EnqueueError::Stopped),
        }
    }

    /// Reads a message from the bound text channel. Bot messages and
    /// messages with nothing speakable are ignored.
    pub async fn on_message(&self, message: &TextMessage) -> Result<(), EnqueueError> {
        if message.author.bot {
            return Ok(());
        }
        let segments = prepare_segments(message, &self.ctx.rules, &self.ctx.announcements);
        if segments.is_empty() {
            return Ok(());
        }
        let preset = self
            .ctx
            .resolver
            .resolve(self.state.guild_id, message.author.id)
            .await;
        match SpeechTask::new(segments, preset) {
            Some(task) => {
                self.enqueue_task(task.with_speaker(message.author.id, &message.author.name))
            }
            None => Ok(()),
        }
    }

    /// Speaks `text` with the guild preset and no speaker annotation.
    pub async fn announce(&self, text: impl Into<String>) -> Result<(), EnqueueError> {
        let preset = self.ctx.resolver.resolve_guild_preset(self.state.guild_id).await;
        match SpeechTask::new([text.into()], preset) {
            Some(task) => self.enqueue_task(task),
            None => Ok(()),
        }
    }

    pub async fn announce_launch(&self) -> Result<(), EnqueueError> {
        self.announce(self.ctx.announcements.launch.clone()).await
    }

    pub async fn on_user_join(&self, member: &Member) -> Result<(), EnqueueError> {
        if member.bot {
            return Ok(());
        }
        tracing::info!(
            guild_id = %self.state.guild_id,
            voice_channel_id = %self.state.voice_channel_id,
            user_id = %member.id,
            "user joined voice channel"
        );
        self.announce(self.ctx.announcements.user_join(&member.name)).await
    }

    pub async fn on_user_leave(&self, member: &Member) -> Result<(), EnqueueError> {
        if member.bot {
            return Ok(());
        }
        tracing::info!(
            guild_id = %self.state.guild_id,
            voice_channel_id = %self.state.voice_channel_id,
            user_id = %member.id,
            "user left voice channel"
        );
        self.announce(self.ctx.announcements.user_leave(&member.name)).await
    }

    /// Stops the worker and player, then closes the transport.
    ///
    /// Calling close again, or concurrently, is a no-op.
    pub async fn close(&self) -> Result<(), SessionError> {
        {
            let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(*status, SessionStatus::Closing | SessionStatus::Closed) {
                return Ok(());
            }
            *status = SessionStatus::Closing;
        }
        self.shutdown.send_replace(true);

        let timeout = self.ctx.config.close_timeout;
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for mut handle in handles {
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                tracing::warn!(
                    voice_channel_id = %self.state.voice_channel_id,
                    "session task did not stop in time, aborting"
                );
                handle.abort();
            }
        }

        let result = match tokio::time::timeout(timeout, self.transport.close()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Transport(e)),
            Err(_) => Err(SessionError::Transport(crate::TransportError::Timeout)),
        };
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = SessionStatus::Closed;

        match &result {
            Ok(()) => tracing::info!(
                guild_id = %self.state.guild_id,
                voice_channel_id = %self.state.voice_channel_id,
                "session closed"
            ),
            Err(e) => tracing::warn!(
                guild_id = %self.state.guild_id,
                voice_channel_id = %self.state.voice_channel_id,
                error = %e,
                "session closed with transport error"
            ),
        }
        result
    }
}

struct Worker {
    tasks: mpsc::Receiver<SpeechTask>,
    audio: mpsc::Sender<SpeechResponse>,
    shutdown: watch::Receiver<bool>,
    ctx: Arc<SessionContext>,
    state: SessionState,
    last_speaker: Option<UserId>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let task = tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => break,
                next = self.tasks.recv() => match next {
                    Some(task) => task,
                    None => break,
                },
            };
            if !self.process(task).await {
                break;
            }
        }
        tracing::debug!(voice_channel_id = %self.state.voice_channel_id, "worker stopped");
    }

    // Returns false when the session is shutting down.
    async fn process(&mut self, task: SpeechTask) -> bool {
        let (mut segments, preset, speaker) = task.into_parts();
        if let Some(speaker) = speaker {
            if self.last_speaker != Some(speaker.id) {
                self.last_speaker = Some(speaker.id);
                if !speaker.name.trim().is_empty() {
                    segments.insert(0, speaker.name);
                }
            }
        }

        let Some(engine) = self.ctx.engines.get(&preset.engine) else {
            tracing::error!(
                voice_channel_id = %self.state.voice_channel_id,
                preset = %preset.id,
                engine = %preset.engine,
                "engine not registered, dropping task"
            );
            return true;
        };

        for segment in segments {
            let request = SpeechRequest::for_preset(segment, &preset);
            let synthesis =
                tokio::time::timeout(self.ctx.config.synthesis_timeout, engine.generate_speech(&request));
            let result = tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => return false,
                result = synthesis => result,
            };
            match result {
                Ok(Ok(response)) => match self.audio.try_send(response) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            voice_channel_id = %self.state.voice_channel_id,
                            "audio queue full, dropping segment"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => return false,
                },
                Ok(Err(e)) => {
                    tracing::warn!(
                        voice_channel_id = %self.state.voice_channel_id,
                        engine = %preset.engine,
                        error = %e,
                        "synthesis failed, dropping segment"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        voice_channel_id = %self.state.voice_channel_id,
                        engine = %preset.engine,
                        timeout_ms = self.ctx.config.synthesis_timeout.as_millis() as u64,
                        "synthesis timed out, dropping segment"
                    );
                }
            }
        }
        true
    }
}
