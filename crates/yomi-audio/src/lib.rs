//! Audio decoding and format conversion for voice playback.
//!
//! Engines return encoded clips in whatever container they produce. Voice
//! transports consume a single fixed format: 48 kHz, stereo, interleaved
//! `i16`, in 20 ms frames. [`render`] turns the former into the latter:
//!
//! 1. [`decode`](decode::decode) the container with symphonia;
//! 2. [`adapt`](resample::adapt) channel count and sample rate with rubato;
//! 3. wrap the samples in a [`PcmTrack`] that hands out frames.

pub mod decode;
pub mod error;
pub mod frame;
pub mod resample;

pub use decode::DecodedAudio;
pub use error::AudioError;
pub use frame::{FrameSource, PcmTrack, CHANNELS, FRAME_LEN, FRAME_SAMPLES, SAMPLE_RATE};

use yomi_types::SpeechResponse;

/// Decodes `response` and converts it to the transport output format.
///
/// CPU bound; async callers should run it on a blocking thread.
pub fn render(response: &SpeechResponse) -> Result<PcmTrack, AudioError> {
    let decoded = decode::decode(response)?;
    let samples = resample::adapt(&decoded)?;
    Ok(PcmTrack::new(samples))
}
