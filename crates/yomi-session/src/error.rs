use thiserror::Error;
use yomi_types::ChannelId;

/// Why a task was not accepted. The task is dropped either way.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("session is stopped")]
    Stopped,

    #[error("task queue is full")]
    Saturated,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session already started")]
    AlreadyStarted,

    #[error("session is closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("voice channel {0} already has a session")]
    VoiceChannelBound(ChannelId),

    #[error("reading channel {0} is already bound to a session")]
    ReadingChannelBound(ChannelId),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("invalid session record: expected 24 bytes, got {0}")]
    InvalidRecord(usize),

    #[error("store error: {0}")]
    Store(#[from] yomi_db::KvError),

    #[error("store operation timed out")]
    Timeout,

    #[error("persistence requires a tokio runtime")]
    NoRuntime,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to open voice channel {channel}: {reason}")]
    Open { channel: ChannelId, reason: String },

    #[error("transport operation timed out")]
    Timeout,

    #[error("transport is not open")]
    NotOpen,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
