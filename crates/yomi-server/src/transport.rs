//! File-backed voice transport.
//!
//! Stands in for a real voice gateway connection: while open, it pulls one
//! frame every 20 ms from the registered source and appends it as raw
//! 48 kHz stereo `s16le` PCM to `{output_dir}/{guild}-{channel}.pcm`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use yomi_audio::FrameSource;
use yomi_session::{TransportError, TransportFactory, VoiceTransport};
use yomi_types::{ChannelId, GuildId};

const FRAME_INTERVAL: Duration = Duration::from_millis(20);

type SharedSource = Arc<Mutex<Option<Box<dyn FrameSource>>>>;

struct Pump {
    stop: watch::Sender<bool>,
    handle: JoinHandle<std::io::Result<()>>,
}

pub struct FileSinkTransport {
    path: PathBuf,
    source: SharedSource,
    pump: tokio::sync::Mutex<Option<Pump>>,
}

impl FileSinkTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: Arc::new(Mutex::new(None)),
            pump: tokio::sync::Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl VoiceTransport for FileSinkTransport {
    async fn open(&self, channel: ChannelId) -> Result<(), TransportError> {
        let mut pump = self.pump.lock().await;
        if pump.is_some() {
            return Ok(());
        }
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| TransportError::Open {
                    channel,
                    reason: e.to_string(),
                })?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| TransportError::Open {
                channel,
                reason: e.to_string(),
            })?;

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_pump(file, Arc::clone(&self.source), stop_rx));
        *pump = Some(Pump { stop, handle });

        tracing::info!(
            voice_channel_id = %channel,
            path = %self.path.display(),
            "voice sink opened"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let Some(pump) = self.pump.lock().await.take() else {
            return Ok(());
        };
        pump.stop.send_replace(true);
        match pump.handle.await {
            Ok(result) => result?,
            Err(e) => return Err(TransportError::Io(std::io::Error::other(e))),
        }
        tracing::info!(path = %self.path.display(), "voice sink closed");
        Ok(())
    }

    fn set_frame_source(&self, source: Box<dyn FrameSource>) {
        *self.source.lock().unwrap_or_else(PoisonError::into_inner) = Some(source);
    }
}

async fn run_pump(
    mut file: tokio::fs::File,
    source: SharedSource,
    mut stop: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = stop.wait_for(|s| *s) => break,
            _ = ticker.tick() => {}
        }
        let frame = source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .and_then(|s| s.next_frame());
        if let Some(frame) = frame {
            let bytes: Vec<u8> = frame.iter().flat_map(|s| s.to_le_bytes()).collect();
            file.write_all(&bytes).await?;
        }
    }
    file.flush().await
}

/// Creates a [`FileSinkTransport`] per session under one directory.
pub struct FileSinkFactory {
    output_dir: PathBuf,
}

impl FileSinkFactory {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl TransportFactory for FileSinkFactory {
    fn create(&self, guild: GuildId, voice_channel: ChannelId) -> Arc<dyn VoiceTransport> {
        Arc::new(FileSinkTransport::new(
            self.output_dir.join(format!("{guild}-{voice_channel}.pcm")),
        ))
    }
}
