//! Acknowledgement tone

use std::path::Path;

use crate::{Error, Result};

const BEEP_FREQUENCY: f32 = 880.0;
const BEEP_DURATION_SECS: f32 = 0.2;
const BEEP_VOLUME: f32 = 0.5;
const BEEP_SAMPLE_RATE: u32 = 44100;

/// Write the acknowledgement beep unless `path` already exists
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn write_beep_wav(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    tracing::info!(path = %path.display(), "generating beep");

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: BEEP_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| Error::Synthesis(e.to_string()))?;

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    {
        let n_samples = (BEEP_SAMPLE_RATE as f32 * BEEP_DURATION_SECS) as u32;
        for i in 0..n_samples {
            let t = i as f32 / BEEP_SAMPLE_RATE as f32;
            let value = BEEP_VOLUME * (2.0 * std::f32::consts::PI * BEEP_FREQUENCY * t).sin();
            writer
                .write_sample((value * 32767.0) as i16)
                .map_err(|e| Error::Synthesis(e.to_string()))?;
        }
    }

    writer.finalize().map_err(|e| Error::Synthesis(e.to_string()))?;
    Ok(())
}
