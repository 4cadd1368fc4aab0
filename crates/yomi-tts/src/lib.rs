//! Speech synthesis backends for yomi.
//!
//! Every backend implements [`Engine`]. Engines are registered by name in an
//! [`EngineRegistry`] at boot and looked up by the engine name a preset
//! carries. [`CachedEngine`] wraps any engine with a content-addressed cache
//! on top of a [`yomi_db::KvStore`].

pub mod cache;
pub mod engine;
pub mod error;
pub mod espeak;
pub mod google;

pub use cache::CachedEngine;
pub use engine::{Engine, EngineRegistry, MAX_TTS_INPUT_BYTES};
pub use error::EngineError;
pub use espeak::EspeakEngine;
pub use google::GoogleEngine;
