use crate::error::EngineError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use yomi_types::{SpeechRequest, SpeechResponse};

/// Maximum text input size for one synthesis request (64 KiB).
pub const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// A text-to-speech backend.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Registry name, e.g. `espeak` or `google`. Presets refer to engines
    /// by this name.
    fn name(&self) -> &str;

    /// Synthesizes `request.text` into one encoded clip.
    async fn generate_speech(&self, request: &SpeechRequest)
        -> Result<SpeechResponse, EngineError>;
}

pub(crate) fn check_input_size(text: &str) -> Result<(), EngineError> {
    if text.len() > MAX_TTS_INPUT_BYTES {
        return Err(EngineError::InputTooLarge {
            len: text.len(),
            limit: MAX_TTS_INPUT_BYTES,
        });
    }
    Ok(())
}

/// Engines by name. Built once at boot and shared read-only.
#[derive(Default, Clone)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<dyn Engine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `engine` under its own name.
    pub fn register(&mut self, engine: Arc<dyn Engine>) -> Result<(), EngineError> {
        let name = engine.name().to_string();
        if self.engines.contains_key(&name) {
            return Err(EngineError::AlreadyRegistered(name));
        }
        self.engines.insert(name, engine);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Engine>> {
        self.engines.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    /// Replaces every engine with `wrap(engine)`, keeping the names.
    pub fn map_engines(self, mut wrap: impl FnMut(Arc<dyn Engine>) -> Arc<dyn Engine>) -> Self {
        Self {
            engines: self
                .engines
                .into_iter()
                .map(|(name, engine)| (name, wrap(engine)))
                .collect(),
        }
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.engines.keys()).finish()
    }
}
