use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use yomi_audio::FrameSource;
use yomi_preset::{MemoryPresetIdStore, PresetRegistry, PresetResolver};
use yomi_server::{app, AppState};
use yomi_session::{
    Announcements, MessageRules, SessionConfig, SessionContext, SessionRouter, TransportError,
    TransportFactory, VoiceStates, VoiceTransport,
};
use yomi_tts::{Engine, EngineError, EngineRegistry};
use yomi_types::{ChannelId, GuildId, Preset, PresetId, SpeechRequest, SpeechResponse};

#[derive(Default)]
struct SilentEngine {
    spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl Engine for SilentEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate_speech(&self, request: &SpeechRequest) -> Result<SpeechResponse, EngineError> {
        self.spoken.lock().unwrap().push(request.text.clone());
        Err(EngineError::Process("no audio in tests".to_string()))
    }
}

struct NullTransport {
    refuse: bool,
}

#[async_trait]
impl VoiceTransport for NullTransport {
    async fn open(&self, channel: ChannelId) -> Result<(), TransportError> {
        if self.refuse {
            return Err(TransportError::Open {
                channel,
                reason: "refused".to_string(),
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn set_frame_source(&self, _source: Box<dyn FrameSource>) {}
}

/// Refuses to open voice channel 666.
#[derive(Default)]
struct NullFactory {
    created: AtomicUsize,
}

impl TransportFactory for NullFactory {
    fn create(&self, _guild: GuildId, voice_channel: ChannelId) -> Arc<dyn VoiceTransport> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Arc::new(NullTransport {
            refuse: voice_channel == ChannelId(666),
        })
    }
}

fn preset(id: &str, language: &str) -> Preset {
    Preset {
        id: PresetId::new(id),
        engine: "fake".to_string(),
        language: language.to_string(),
        voice_name: String::new(),
        speaking_rate: 1.0,
    }
}

struct Harness {
    state: AppState,
    engine: Arc<SilentEngine>,
    factory: Arc<NullFactory>,
}

fn harness() -> Harness {
    let registry = Arc::new(
        PresetRegistry::from_presets([preset("default", "en-US"), preset("ja", "ja-JP")]).unwrap(),
    );
    let preset_store = Arc::new(MemoryPresetIdStore::new());
    let resolver = Arc::new(
        PresetResolver::new(registry, preset_store.clone(), PresetId::new("default")).unwrap(),
    );

    let engine = Arc::new(SilentEngine::default());
    let mut engines = EngineRegistry::new();
    engines.register(engine.clone()).unwrap();

    let factory = Arc::new(NullFactory::default());
    let state = AppState {
        resolver: resolver.clone(),
        preset_store,
        router: Arc::new(SessionRouter::new(Arc::new(VoiceStates::new()))),
        sessions: Arc::new(SessionContext {
            engines: Arc::new(engines),
            resolver,
            rules: MessageRules::default(),
            announcements: Announcements::default(),
            config: SessionConfig {
                close_timeout: Duration::from_secs(1),
                ..SessionConfig::default()
            },
        }),
        transports: factory.clone(),
        open_timeout: Duration::from_secs(1),
    };
    Harness {
        state,
        engine,
        factory,
    }
}

async fn send(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, json)
}

#[tokio::test]
async fn health_check_returns_ok() {
    let h = harness();
    let (status, body) = send(&h.state, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn presets_are_listed_in_registration_order() {
    let h = harness();
    let (status, body) = send(&h.state, "GET", "/api/presets", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["default", "ja"]);
}

#[tokio::test]
async fn assignments_drive_resolution() {
    let h = harness();

    let (status, body) = send(&h.state, "GET", "/api/presets/resolve?guild_id=1&user_id=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "default");

    let (status, body) = send(
        &h.state,
        "PUT",
        "/api/presets/guild/1",
        Some(json!({"preset_id": "ja"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scope"], "guild");
    assert_eq!(body["owner_id"], 1);

    let (_, body) = send(&h.state, "GET", "/api/presets/resolve?guild_id=1&user_id=2", None).await;
    assert_eq!(body["id"], "ja");
    let (_, body) = send(&h.state, "GET", "/api/presets/resolve?guild_id=1", None).await;
    assert_eq!(body["language"], "ja-JP");

    let (status, _) = send(&h.state, "DELETE", "/api/presets/guild/1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&h.state, "GET", "/api/presets/resolve?guild_id=1", None).await;
    assert_eq!(body["id"], "default");
}

#[tokio::test]
async fn unknown_presets_and_scopes_are_rejected() {
    let h = harness();
    let (status, body) = send(
        &h.state,
        "PUT",
        "/api/presets/user/5",
        Some(json!({"preset_id": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));

    let (status, _) = send(
        &h.state,
        "PUT",
        "/api/presets/channel/5",
        Some(json!({"preset_id": "ja"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_join_conflicts_and_leave() {
    let h = harness();
    let join = |voice: u64, reading: u64| {
        json!({"guild_id": 1, "voice_channel_id": voice, "reading_channel_id": reading})
    };

    let (status, body) = send(&h.state, "POST", "/api/sessions", Some(join(10, 20))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["voice_channel_id"], 10);

    let (status, _) = send(&h.state, "POST", "/api/sessions", Some(join(10, 21))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send(&h.state, "POST", "/api/sessions", Some(join(11, 20))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    // Conflicts are caught before a transport is created.
    assert_eq!(h.factory.created.load(Ordering::SeqCst), 1);

    let (status, body) = send(&h.state, "GET", "/api/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["reading_channel_id"], 20);

    let (status, _) = send(&h.state, "DELETE", "/api/sessions/10", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&h.state, "DELETE", "/api/sessions/10", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(h.state.router.is_empty());
}

#[tokio::test]
async fn transport_failure_is_a_bad_gateway() {
    let h = harness();
    let (status, body) = send(
        &h.state,
        "POST",
        "/api/sessions",
        Some(json!({"guild_id": 1, "voice_channel_id": 666, "reading_channel_id": 20})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("refused"));
    assert!(h.state.router.is_empty());
}

#[tokio::test]
async fn events_reach_the_session() {
    let h = harness();
    let (status, _) = send(
        &h.state,
        "POST",
        "/api/sessions",
        Some(json!({"guild_id": 1, "voice_channel_id": 10, "reading_channel_id": 20})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &h.state,
        "POST",
        "/api/events",
        Some(json!({
            "type": "message_created",
            "guild_id": 1,
            "channel_id": 20,
            "author": {"id": 7, "name": "alice"},
            "content": "**hello** <:wave:1>"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    for _ in 0..300 {
        if h.engine.spoken.lock().unwrap().len() >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        *h.engine.spoken.lock().unwrap(),
        vec!["Text to speech is now active.", "alice", "hello wave"]
    );

    let (status, _) = send(&h.state, "POST", "/api/events", Some(json!({"type": "bogus"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    for session in h.state.router.sessions() {
        session.close().await.unwrap();
    }
}
