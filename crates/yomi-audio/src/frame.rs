/// Output sample rate of every voice transport.
pub const SAMPLE_RATE: u32 = 48_000;
/// Output channel count.
pub const CHANNELS: usize = 2;
/// Samples per channel in one 20 ms frame.
pub const FRAME_SAMPLES: usize = 960;
/// Interleaved samples in one frame.
pub const FRAME_LEN: usize = FRAME_SAMPLES * CHANNELS;

/// Pull-based producer of output frames.
///
/// A transport calls `next_frame` once per 20 ms tick. `None` means there
/// is nothing to play right now; the transport sends silence or nothing.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Option<Vec<i16>>;
}

/// A fully decoded clip in output format, consumed frame by frame.
#[derive(Debug, Clone, Default)]
pub struct PcmTrack {
    samples: Vec<i16>,
    position: usize,
}

impl PcmTrack {
    /// Wraps interleaved stereo samples at [`SAMPLE_RATE`].
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples,
            position: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.samples.len()
    }

    /// Number of frames still to be produced.
    pub fn remaining_frames(&self) -> usize {
        self.samples.len().saturating_sub(self.position).div_ceil(FRAME_LEN)
    }

    pub fn duration_ms(&self) -> u64 {
        (self.samples.len() / CHANNELS) as u64 * 1000 / u64::from(SAMPLE_RATE)
    }
}

impl FrameSource for PcmTrack {
    /// Returns the next frame, zero-padding the final partial one.
    fn next_frame(&mut self) -> Option<Vec<i16>> {
        if self.is_finished() {
            return None;
        }
        let end = (self.position + FRAME_LEN).min(self.samples.len());
        let mut frame = self.samples[self.position..end].to_vec();
        frame.resize(FRAME_LEN, 0);
        self.position = end;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_fixed_size_and_padded() {
        let mut track = PcmTrack::new((0..(FRAME_LEN as i16 + 4)).collect());
        assert_eq!(track.remaining_frames(), 2);

        let first = track.next_frame().unwrap();
        assert_eq!(first.len(), FRAME_LEN);
        assert_eq!(first[0], 0);

        let second = track.next_frame().unwrap();
        assert_eq!(second.len(), FRAME_LEN);
        assert_eq!(&second[..4], &[1920, 1921, 1922, 1923]);
        assert!(second[4..].iter().all(|&s| s == 0));

        assert!(track.next_frame().is_none());
        assert!(track.is_finished());
    }

    #[test]
    fn one_second_of_audio_is_fifty_frames() {
        let track = PcmTrack::new(vec![0; SAMPLE_RATE as usize * CHANNELS]);
        assert_eq!(track.remaining_frames(), 50);
        assert_eq!(track.duration_ms(), 1000);
    }
}
