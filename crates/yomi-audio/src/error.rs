use thiserror::Error;
use yomi_types::AudioFormat;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(AudioFormat),

    #[error("no decodable audio track in clip")]
    NoAudioTrack,

    #[error("clip decoded to no samples")]
    Empty,

    #[error("decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("failed to build resampler: {0}")]
    ResamplerInit(#[from] rubato::ResamplerConstructionError),

    #[error("resample error: {0}")]
    Resample(#[from] rubato::ResampleError),
}
