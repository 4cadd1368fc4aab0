//! yomi server library logic.

pub mod api;
pub mod background;
pub mod bootstrap;
pub mod config;
pub mod transport;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use yomi_preset::{PresetIdStore, PresetResolver};
use yomi_session::{
    Session, SessionContext, SessionError, SessionRouter, SessionState, TransportError,
    TransportFactory,
};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Preset chain; also owns the preset registry.
    pub resolver: Arc<PresetResolver>,
    /// Durable scoped preset assignments.
    pub preset_store: Arc<dyn PresetIdStore>,
    /// Live sessions.
    pub router: Arc<SessionRouter>,
    /// Dependencies handed to every new session.
    pub sessions: Arc<SessionContext>,
    /// Source of voice transports.
    pub transports: Arc<dyn TransportFactory>,
    /// Deadline for opening a voice transport.
    pub open_timeout: Duration,
}

impl AppState {
    /// Opens a transport for `state` and starts a session on it.
    ///
    /// The session is not added to the router; callers decide whether it
    /// becomes live.
    pub async fn open_session(&self, state: SessionState) -> Result<Arc<Session>, SessionError> {
        let transport = self
            .transports
            .create(state.guild_id, state.voice_channel_id);
        match tokio::time::timeout(self.open_timeout, transport.open(state.voice_channel_id)).await {
            Ok(result) => result?,
            Err(_) => return Err(SessionError::Transport(TransportError::Timeout)),
        }

        let session = Arc::new(Session::new(state, transport, Arc::clone(&self.sessions)));
        if let Err(e) = session.start() {
            let _ = session.close().await;
            return Err(e);
        }
        if let Err(e) = session.announce_launch().await {
            tracing::warn!(
                voice_channel_id = %state.voice_channel_id,
                error = %e,
                "launch announcement not queued"
            );
        }
        Ok(session)
    }
}

/// Maximum request body size (256 KiB).
const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/presets", get(api::list_presets_handler))
        .route("/api/presets/resolve", get(api::resolve_preset_handler))
        .route(
            "/api/presets/{scope}/{ownerId}",
            put(api::set_preset_handler).delete(api::delete_preset_handler),
        )
        .route(
            "/api/sessions",
            post(api::create_session_handler).get(api::list_sessions_handler),
        )
        .route(
            "/api/sessions/{voiceChannelId}",
            axum::routing::delete(api::delete_session_handler),
        )
        .route("/api/events", post(api::post_event_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
