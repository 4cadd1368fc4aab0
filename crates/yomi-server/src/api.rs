//! HTTP control surface: preset assignment, session join/leave and event
//! ingestion.

use crate::AppState;
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use yomi_preset::StoreError;
use yomi_session::{PlatformEvent, RouterError, SessionError, SessionState};
use yomi_types::{ChannelId, GuildId, Preset, PresetId, Scope, UserId};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("voice transport failed: {0}")]
    BadGateway(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<RouterError> for ApiError {
    fn from(e: RouterError) -> Self {
        ApiError::Conflict(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::InternalServerError(format!("preset store failed: {}", e))
    }
}

fn parse_scope(raw: &str) -> Result<Scope, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("unknown scope: {}", raw)))
}

/// Handler for `GET /api/presets`.
pub async fn list_presets_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Vec<Preset>> {
    Json(state.resolver.registry().list().to_vec())
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub guild_id: GuildId,
    pub user_id: Option<UserId>,
}

/// Handler for `GET /api/presets/resolve`.
///
/// Without `user_id` only the guild scope and the fallback are consulted.
pub async fn resolve_preset_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ResolveQuery>,
) -> Json<Preset> {
    let preset = match query.user_id {
        Some(user) => state.resolver.resolve(query.guild_id, user).await,
        None => state.resolver.resolve_guild_preset(query.guild_id).await,
    };
    Json(preset)
}

#[derive(Debug, Deserialize)]
pub struct SetPresetRequest {
    pub preset_id: PresetId,
}

#[derive(Debug, Serialize)]
pub struct PresetAssignment {
    pub scope: Scope,
    pub owner_id: u64,
    pub preset_id: PresetId,
}

/// Handler for `PUT /api/presets/{scope}/{ownerId}`.
pub async fn set_preset_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((scope, owner_id)): Path<(String, u64)>,
    Json(payload): Json<SetPresetRequest>,
) -> Result<Json<PresetAssignment>, ApiError> {
    let scope = parse_scope(&scope)?;
    if !state.resolver.registry().contains(&payload.preset_id) {
        return Err(ApiError::NotFound(format!(
            "preset {} is not registered",
            payload.preset_id
        )));
    }

    state
        .preset_store
        .save(scope, owner_id, &payload.preset_id)
        .await?;
    tracing::info!(
        scope = scope.as_str(),
        owner_id,
        preset_id = %payload.preset_id,
        "preset assigned"
    );

    Ok(Json(PresetAssignment {
        scope,
        owner_id,
        preset_id: payload.preset_id,
    }))
}

/// Handler for `DELETE /api/presets/{scope}/{ownerId}`.
pub async fn delete_preset_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((scope, owner_id)): Path<(String, u64)>,
) -> Result<StatusCode, ApiError> {
    let scope = parse_scope(&scope)?;
    state.preset_store.delete(scope, owner_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub guild_id: GuildId,
    pub voice_channel_id: ChannelId,
    pub reading_channel_id: ChannelId,
}

/// Handler for `POST /api/sessions`.
///
/// Joins the voice channel and starts reading the text channel.
pub async fn create_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionState>), ApiError> {
    let session_state = SessionState {
        guild_id: payload.guild_id,
        voice_channel_id: payload.voice_channel_id,
        reading_channel_id: payload.reading_channel_id,
    };

    // Reject early so a doomed join never touches the transport.
    if state.router.get_by_voice(payload.voice_channel_id).is_some() {
        return Err(RouterError::VoiceChannelBound(payload.voice_channel_id).into());
    }
    if state.router.get_by_reading(payload.reading_channel_id).is_some() {
        return Err(RouterError::ReadingChannelBound(payload.reading_channel_id).into());
    }

    let session = state
        .open_session(session_state)
        .await
        .map_err(|e| match e {
            SessionError::Transport(e) => ApiError::BadGateway(e.to_string()),
            other => ApiError::InternalServerError(other.to_string()),
        })?;

    if let Err(e) = state.router.add(Arc::clone(&session)) {
        let _ = session.close().await;
        return Err(e.into());
    }

    Ok((StatusCode::CREATED, Json(session_state)))
}

/// Handler for `GET /api/sessions`.
pub async fn list_sessions_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<Vec<SessionState>> {
    Json(state.router.states())
}

/// Handler for `DELETE /api/sessions/{voiceChannelId}`.
pub async fn delete_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(voice_channel_id): Path<ChannelId>,
) -> Result<StatusCode, ApiError> {
    let session = state
        .router
        .delete(voice_channel_id)
        .ok_or_else(|| ApiError::NotFound(format!("no session in {}", voice_channel_id)))?;
    if let Err(e) = session.close().await {
        tracing::warn!(voice_channel_id = %voice_channel_id, error = %e, "session closed uncleanly");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `POST /api/events`.
pub async fn post_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(event): Json<PlatformEvent>,
) -> StatusCode {
    state.router.dispatch(event).await;
    StatusCode::ACCEPTED
}
