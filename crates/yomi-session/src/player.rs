//! Per-session audio player.
//!
//! The [`TrackPlayer`] drains the audio queue one response at a time. Each
//! response is decoded off the async runtime, then handed to the
//! [`PlayerSource`] that the transport pulls frames from. The player waits
//! for the source to report end-of-track before it takes the next response.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch, Notify};
use yomi_audio::{FrameSource, PcmTrack};
use yomi_types::SpeechResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
}

#[derive(Default)]
struct Shared {
    track: Mutex<Option<PcmTrack>>,
    ended: Notify,
}

/// Frame source registered with the transport.
pub struct PlayerSource {
    shared: Arc<Shared>,
}

impl FrameSource for PlayerSource {
    fn next_frame(&mut self) -> Option<Vec<i16>> {
        let mut slot = self
            .shared
            .track
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let track = slot.as_mut()?;
        let frame = track.next_frame();
        if track.is_finished() {
            *slot = None;
            self.shared.ended.notify_one();
        }
        frame
    }
}

pub struct TrackPlayer {
    queue: mpsc::Receiver<SpeechResponse>,
    shutdown: watch::Receiver<bool>,
    shared: Arc<Shared>,
    state: watch::Sender<PlayerState>,
}

impl TrackPlayer {
    /// Builds a player and the frame source it feeds.
    pub fn new(
        queue: mpsc::Receiver<SpeechResponse>,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, PlayerSource) {
        let shared = Arc::new(Shared::default());
        let (state, _) = watch::channel(PlayerState::Idle);
        let player = Self {
            queue,
            shutdown,
            shared: Arc::clone(&shared),
            state,
        };
        (player, PlayerSource { shared })
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerState> {
        self.state.subscribe()
    }

    /// Plays responses until the queue closes or shutdown is signaled.
    pub async fn run(mut self) {
        loop {
            let response = tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => break,
                next = self.queue.recv() => match next {
                    Some(response) => response,
                    None => break,
                },
            };

            let format = response.format;
            let track = match tokio::task::spawn_blocking(move || yomi_audio::render(&response)).await {
                Ok(Ok(track)) => track,
                Ok(Err(e)) => {
                    tracing::warn!(%format, error = %e, "dropping undecodable segment");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "decode task failed");
                    continue;
                }
            };
            if track.is_finished() {
                continue;
            }

            tracing::debug!(duration_ms = track.duration_ms(), "playing track");
            self.install(Some(track));
            self.state.send_replace(PlayerState::Playing);

            let interrupted = tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => true,
                _ = self.shared.ended.notified() => false,
            };
            self.state.send_replace(PlayerState::Idle);
            if interrupted {
                break;
            }
        }
        self.install(None);
        self.state.send_replace(PlayerState::Idle);
    }

    fn install(&self, track: Option<PcmTrack>) {
        *self
            .shared
            .track
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = track;
    }
}

/// Resolves once shutdown is signaled or the sender is gone.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
