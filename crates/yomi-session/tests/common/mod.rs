#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use yomi_audio::FrameSource;
use yomi_preset::{MemoryPresetIdStore, PresetRegistry, PresetResolver};
use yomi_session::{
    Announcements, MessageRules, Session, SessionConfig, SessionContext, SessionState,
    TransportError, VoiceTransport,
};
use yomi_tts::{Engine, EngineError, EngineRegistry};
use yomi_types::{
    AudioFormat, ChannelId, GuildId, Preset, PresetId, SpeechRequest, SpeechResponse,
};

pub const GUILD: GuildId = GuildId(1);
pub const VOICE: ChannelId = ChannelId(10);
pub const READING: ChannelId = ChannelId(20);

pub fn state(voice: u64, reading: u64) -> SessionState {
    SessionState {
        guild_id: GUILD,
        voice_channel_id: ChannelId(voice),
        reading_channel_id: ChannelId(reading),
    }
}

/// One 20 ms frame of 48 kHz stereo WAV.
pub fn short_wav() -> Vec<u8> {
    let samples = 960 * 2;
    let data_len = (samples * 2) as u32;
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&48_000u32.to_le_bytes());
    out.extend_from_slice(&(48_000u32 * 4).to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for i in 0..samples {
        out.extend_from_slice(&(100 + (i % 7) as i16).to_le_bytes());
    }
    out
}

/// Records every text it is asked to speak. Texts equal to "boom" fail.
#[derive(Default)]
pub struct RecordingEngine {
    spoken: Mutex<Vec<String>>,
}

impl RecordingEngine {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl Engine for RecordingEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate_speech(&self, request: &SpeechRequest) -> Result<SpeechResponse, EngineError> {
        self.spoken.lock().unwrap().push(request.text.clone());
        if request.text == "boom" {
            return Err(EngineError::Process("boom".to_string()));
        }
        Ok(SpeechResponse {
            format: AudioFormat::Wav,
            channels: 2,
            audio: short_wav(),
        })
    }
}

/// Never answers for texts equal to "stall"; otherwise behaves like
/// [`RecordingEngine`].
#[derive(Default)]
pub struct StallingEngine {
    inner: RecordingEngine,
}

impl StallingEngine {
    pub fn spoken(&self) -> Vec<String> {
        self.inner.spoken()
    }
}

#[async_trait]
impl Engine for StallingEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate_speech(&self, request: &SpeechRequest) -> Result<SpeechResponse, EngineError> {
        if request.text == "stall" {
            self.inner.spoken.lock().unwrap().push(request.text.clone());
            return std::future::pending().await;
        }
        self.inner.generate_speech(request).await
    }
}

#[derive(Default)]
pub struct FakeTransport {
    opened: Mutex<Option<ChannelId>>,
    closed: AtomicBool,
    source: Mutex<Option<Box<dyn FrameSource>>>,
    pub fail_open: bool,
}

impl FakeTransport {
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> Option<ChannelId> {
        *self.opened.lock().unwrap()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Pulls one frame the way a live transport does every 20 ms.
    pub fn pull(&self) -> Option<Vec<i16>> {
        self.source.lock().unwrap().as_mut()?.next_frame()
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn open(&self, channel: ChannelId) -> Result<(), TransportError> {
        if self.fail_open {
            return Err(TransportError::Open {
                channel,
                reason: "refused".to_string(),
            });
        }
        *self.opened.lock().unwrap() = Some(channel);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_frame_source(&self, source: Box<dyn FrameSource>) {
        *self.source.lock().unwrap() = Some(source);
    }
}

pub fn preset(id: &str) -> Preset {
    Preset {
        id: PresetId::new(id),
        engine: "fake".to_string(),
        language: "en-US".to_string(),
        voice_name: String::new(),
        speaking_rate: 1.0,
    }
}

pub fn context(engine: Arc<RecordingEngine>, task_queue_capacity: usize) -> Arc<SessionContext> {
    context_with(
        engine,
        SessionConfig {
            task_queue_capacity,
            close_timeout: Duration::from_secs(1),
            ..SessionConfig::default()
        },
    )
}

pub fn context_with(engine: Arc<dyn Engine>, config: SessionConfig) -> Arc<SessionContext> {
    let registry = Arc::new(PresetRegistry::from_presets([preset("default")]).unwrap());
    let resolver = PresetResolver::new(
        registry,
        Arc::new(MemoryPresetIdStore::new()),
        PresetId::new("default"),
    )
    .unwrap();

    let mut engines = EngineRegistry::new();
    engines.register(engine).unwrap();

    Arc::new(SessionContext {
        engines: Arc::new(engines),
        resolver: Arc::new(resolver),
        rules: MessageRules::default(),
        announcements: Announcements::default(),
        config,
    })
}

pub fn session(
    state: SessionState,
    ctx: &Arc<SessionContext>,
) -> (Arc<Session>, Arc<FakeTransport>) {
    let transport = Arc::new(FakeTransport::default());
    let session = Arc::new(Session::new(state, transport.clone(), Arc::clone(ctx)));
    (session, transport)
}

/// Polls `condition` until it holds or a few seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
