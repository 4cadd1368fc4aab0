//! Content-addressed caching of synthesized clips.

use crate::engine::Engine;
use crate::error::EngineError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use yomi_db::KvStore;
use yomi_types::{AudioFormat, SpeechRequest, SpeechResponse};

const KEY_PREFIX: &str = "tts:cache:";

/// Default deadline for a synthesis call on a cache miss.
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(10);
/// Default deadline for the detached cache write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(3);
/// Default deadline for a cache lookup. A slower store counts as a miss.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Wraps an [`Engine`] and memoizes its output in a [`KvStore`].
///
/// The cache key covers the engine name, language, voice and text. Speaking
/// rate is not part of the key, so a preset whose rate changes keeps
/// serving clips cached at the old rate until they expire.
pub struct CachedEngine {
    inner: Arc<dyn Engine>,
    store: Arc<dyn KvStore>,
    ttl: Duration,
    synthesis_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl CachedEngine {
    pub fn new(inner: Arc<dyn Engine>, store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self {
            inner,
            store,
            ttl,
            synthesis_timeout: DEFAULT_SYNTHESIS_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_synthesis_timeout(mut self, timeout: Duration) -> Self {
        self.synthesis_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Store key for `request` on this engine.
    pub fn cache_key(&self, request: &SpeechRequest) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.inner.name(),
            request.language_code.as_str(),
            request.voice_name.as_str(),
            request.text.as_str(),
        ] {
            hasher.update(part.as_bytes());
            // Separator keeps ("ab", "c") and ("a", "bc") apart.
            hasher.update([0u8]);
        }
        format!("{KEY_PREFIX}{}", hex::encode(hasher.finalize()))
    }

    async fn read_cached(&self, key: &str) -> Option<SpeechResponse> {
        match tokio::time::timeout(self.read_timeout, self.store.get(key)).await {
            Err(_) => {
                tracing::warn!(key, "cache read timed out, treating as miss");
                None
            }
            Ok(Ok(Some(bytes))) => {
                let decoded = decode_entry(&bytes);
                if decoded.is_none() {
                    tracing::warn!(key, "discarding malformed cache entry");
                }
                decoded
            }
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                tracing::warn!(key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    fn store_detached(&self, key: String, response: &SpeechResponse) {
        let store = Arc::clone(&self.store);
        let value = encode_entry(response);
        let ttl = self.ttl;
        let write_timeout = self.write_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(write_timeout, store.set(&key, &value, Some(ttl))).await {
                Ok(Ok(())) => tracing::debug!(key = %key, "cached synthesized audio"),
                Ok(Err(e)) => tracing::warn!(key = %key, error = %e, "failed to cache audio"),
                Err(_) => tracing::warn!(key = %key, "cache write timed out"),
            }
        });
    }
}

#[async_trait]
impl Engine for CachedEngine {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate_speech(
        &self,
        request: &SpeechRequest,
    ) -> Result<SpeechResponse, EngineError> {
        let key = self.cache_key(request);

        if let Some(hit) = self.read_cached(&key).await {
            tracing::debug!(key = %key, engine = self.inner.name(), "cache hit");
            return Ok(hit);
        }

        let response = tokio::time::timeout(
            self.synthesis_timeout,
            self.inner.generate_speech(request),
        )
        .await
        .map_err(|_| EngineError::Timeout(self.synthesis_timeout))??;

        self.store_detached(key, &response);
        Ok(response)
    }
}

// Entry layout: format code (1 byte), channel count (u16 BE), audio bytes.
fn encode_entry(response: &SpeechResponse) -> Vec<u8> {
    let mut out = Vec::with_capacity(3 + response.audio.len());
    out.push(response.format.as_u8());
    out.extend_from_slice(&response.channels.to_be_bytes());
    out.extend_from_slice(&response.audio);
    out
}

fn decode_entry(bytes: &[u8]) -> Option<SpeechResponse> {
    if bytes.len() < 3 {
        return None;
    }
    let format = AudioFormat::from_u8(bytes[0])?;
    let channels = u16::from_be_bytes([bytes[1], bytes[2]]);
    Some(SpeechResponse {
        format,
        channels,
        audio: bytes[3..].to_vec(),
    })
}
