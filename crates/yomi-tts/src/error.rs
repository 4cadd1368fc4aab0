use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("text exceeds maximum size: {len} bytes (limit: {limit} bytes)")]
    InputTooLarge { len: usize, limit: usize },

    #[error("engine already registered: {0}")]
    AlreadyRegistered(String),

    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },

    #[error("synthesis timed out after {0:?}")]
    Timeout(Duration),

    #[error("synthesis process failed: {0}")]
    Process(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("synthesis API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid synthesis response: {0}")]
    InvalidResponse(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
