//! Channel and sample-rate adaptation to the transport output format.

use crate::decode::DecodedAudio;
use crate::error::AudioError;
use crate::frame::{CHANNELS, SAMPLE_RATE};
use rubato::{FftFixedIn, Resampler};

const CHUNK: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Converts decoded audio to interleaved stereo `i16` at [`SAMPLE_RATE`].
///
/// Mono is duplicated into both channels. Stereo is kept. Wider layouts are
/// down-mixed to mono first.
pub fn adapt(audio: &DecodedAudio) -> Result<Vec<i16>, AudioError> {
    if audio.channels == 0 || audio.samples.is_empty() {
        return Err(AudioError::Empty);
    }

    let planes = to_planes(audio);
    let planes = if audio.sample_rate == SAMPLE_RATE {
        planes
    } else {
        resample_planes(&planes, audio.sample_rate, SAMPLE_RATE)?
    };

    Ok(interleave_stereo(&planes))
}

// Splits interleaved samples into at most two planar channels.
fn to_planes(audio: &DecodedAudio) -> Vec<Vec<f32>> {
    let ch = audio.channels;
    let frames = audio.frames();
    match ch {
        1 => vec![audio.samples[..frames].to_vec()],
        2 => {
            let mut left = Vec::with_capacity(frames);
            let mut right = Vec::with_capacity(frames);
            for frame in audio.samples.chunks_exact(2) {
                left.push(frame[0]);
                right.push(frame[1]);
            }
            vec![left, right]
        }
        _ => {
            let mono = audio
                .samples
                .chunks_exact(ch)
                .map(|frame| frame.iter().sum::<f32>() / ch as f32)
                .collect();
            vec![mono]
        }
    }
}

/// Resamples planar channels from `rate_in` to `rate_out`.
///
/// The resampler's startup delay is trimmed and the tail flushed, so the
/// output holds `len * rate_out / rate_in` frames.
pub fn resample_planes(
    planes: &[Vec<f32>],
    rate_in: u32,
    rate_out: u32,
) -> Result<Vec<Vec<f32>>, AudioError> {
    let channels = planes.len();
    let frames_in = planes.first().map_or(0, Vec::len);
    let mut resampler = FftFixedIn::<f32>::new(
        rate_in as usize,
        rate_out as usize,
        CHUNK,
        SUB_CHUNKS,
        channels,
    )?;

    let expected = (frames_in as u64 * u64::from(rate_out)).div_ceil(u64::from(rate_in)) as usize;
    let delay = resampler.output_delay();
    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay + CHUNK); channels];

    let mut pos = 0;
    while frames_in - pos >= CHUNK {
        let block: Vec<&[f32]> = planes.iter().map(|p| &p[pos..pos + CHUNK]).collect();
        append(&mut out, resampler.process(&block, None)?);
        pos += CHUNK;
    }
    if pos < frames_in {
        let block: Vec<&[f32]> = planes.iter().map(|p| &p[pos..]).collect();
        append(&mut out, resampler.process_partial(Some(block.as_slice()), None)?);
    }
    while out[0].len() < expected + delay {
        append(&mut out, resampler.process_partial::<&[f32]>(None, None)?);
    }

    for plane in &mut out {
        plane.drain(..delay.min(plane.len()));
        plane.truncate(expected);
    }
    Ok(out)
}

fn append(out: &mut [Vec<f32>], block: Vec<Vec<f32>>) {
    for (plane, chunk) in out.iter_mut().zip(block) {
        plane.extend_from_slice(&chunk);
    }
}

fn interleave_stereo(planes: &[Vec<f32>]) -> Vec<i16> {
    let (left, right) = match planes {
        [mono] => (mono, mono),
        [left, right, ..] => (left, right),
        [] => return Vec::new(),
    };
    let mut out = Vec::with_capacity(left.len() * CHANNELS);
    for (&l, &r) in left.iter().zip(right.iter()) {
        out.push(to_i16(l));
        out.push(to_i16(r));
    }
    out
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}
