//! Voice preset and synthesis payload definitions.
//!
//! A `Preset` maps a logical identifier to an engine and its voice
//! parameters. `SpeechRequest` / `SpeechResponse` are the engine contract's
//! input and output.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier of a registered preset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetId(pub String);

impl PresetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PresetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PresetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Reasons a preset definition is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPreset {
    #[error("preset identifier cannot be empty")]
    EmptyIdentifier,
    #[error("preset {0} has no engine")]
    EmptyEngine(PresetId),
}

/// A named bundle of engine, language, voice, and speaking rate.
///
/// Presets are registered at boot and never mutated. Tasks carry a clone,
/// so a snapshot outlives any later change of assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    /// Unique identifier.
    pub id: PresetId,
    /// Name of the engine in the engine registry.
    pub engine: String,
    /// BCP-47 language code, e.g. `ja-JP`.
    pub language: String,
    /// Engine-specific voice name. Empty means the engine default.
    pub voice_name: String,
    /// Speaking rate multiplier. 1.0 is normal, 0.0 means the engine default.
    pub speaking_rate: f64,
}

impl Preset {
    /// Checks the invariants every registered preset must satisfy.
    pub fn validate(&self) -> Result<(), InvalidPreset> {
        if self.id.0.is_empty() {
            return Err(InvalidPreset::EmptyIdentifier);
        }
        if self.engine.is_empty() {
            return Err(InvalidPreset::EmptyEngine(self.id.clone()));
        }
        Ok(())
    }
}

/// Container format of a synthesized clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AudioFormat {
    /// MPEG-1/2 Layer III.
    Mp3 = 1,
    /// RIFF WAVE with PCM samples.
    Wav = 2,
    /// Opus in an Ogg container.
    OggOpus = 3,
}

impl AudioFormat {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Mp3),
            2 => Some(Self::Wav),
            3 => Some(Self::OggOpus),
            _ => None,
        }
    }

    /// File extension passed to the decoder as a format hint.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::OggOpus => "ogg",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Input of one synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub language_code: String,
    pub voice_name: String,
    pub speaking_rate: f64,
}

impl SpeechRequest {
    /// Builds a request that speaks `text` with the parameters of `preset`.
    pub fn for_preset(text: impl Into<String>, preset: &Preset) -> Self {
        Self {
            text: text.into(),
            language_code: preset.language.clone(),
            voice_name: preset.voice_name.clone(),
            speaking_rate: preset.speaking_rate,
        }
    }
}

/// Encoded audio returned by an engine.
#[derive(Clone, PartialEq, Eq)]
pub struct SpeechResponse {
    pub format: AudioFormat,
    pub channels: u16,
    pub audio: Vec<u8>,
}

impl fmt::Debug for SpeechResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechResponse")
            .field("format", &self.format)
            .field("channels", &self.channels)
            .field("audio_len", &self.audio.len())
            .finish()
    }
}
