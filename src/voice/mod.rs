//! Voice processing module
//!
//! Handles audio capture, speech recognition, wake word matching and the
//! speech synthesis pipeline.

mod capture;
pub mod synthesis;
mod tone;
pub mod transcriber;
mod wake_word;

pub use capture::{AudioCapture, FrameSource};
pub use synthesis::{PlaybackOutcome, PlaybackReport, ProcessSpec, SynthesisPipeline, Voice};
pub use tone::write_beep_wav;
pub use transcriber::{Recognition, SidecarTranscriber, Transcriber};
pub use wake_word::WakeWordMatcher;

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per frame handed to the recognizers
pub const FRAME_SIZE: usize = 2048;

/// Block of mono 16-bit PCM samples at [`SAMPLE_RATE`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
}

impl AudioFrame {
    /// Wrap PCM samples
    #[must_use]
    pub const fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Silent frame of [`FRAME_SIZE`] samples
    #[must_use]
    pub fn silence() -> Self {
        Self::new(vec![0; FRAME_SIZE])
    }

    /// Convert f32 [-1.0, 1.0] samples
    #[must_use]
    pub fn from_f32(samples: &[f32]) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let pcm = samples
            .iter()
            .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
            .collect();
        Self::new(pcm)
    }

    /// Raw samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Little-endian PCM bytes
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// RMS level normalized to [0.0, 1.0]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let sum_squares: f32 = self
            .samples
            .iter()
            .map(|&s| {
                let s = f32::from(s) / 32768.0;
                s * s
            })
            .sum();
        (sum_squares / self.samples.len() as f32).sqrt()
    }
}
