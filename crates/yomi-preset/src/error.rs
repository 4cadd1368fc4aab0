use thiserror::Error;
use yomi_types::voice::InvalidPreset;
use yomi_types::PresetId;

/// Errors raised while building the registry or the resolver.
#[derive(Error, Debug)]
pub enum PresetError {
    #[error("invalid preset: {0}")]
    Invalid(#[from] InvalidPreset),

    #[error("preset already registered: {0}")]
    Duplicate(PresetId),

    #[error("fallback preset {0} is not registered")]
    FallbackNotRegistered(PresetId),
}

/// Errors returned by a [`PresetIdStore`](crate::PresetIdStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("preset id not found")]
    NotFound,

    #[error("failed to get database connection: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("in-memory store lock poisoned")]
    Poisoned,
}
