use std::path::Path;

use super::AudioFormat;
use crate::error::{Result, StudioError};

/// Statistics of a finished take.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelStats {
    pub frames: u64,
    pub duration_secs: f64,
    pub peak_abs: i32,
    pub rms: f32,
    pub abs_mean: f32,
}

impl LevelStats {
    /// Peak relative to full scale, in dBFS. `-inf` for digital silence.
    pub fn peak_dbfs(&self) -> f32 {
        if self.peak_abs <= 0 {
            return f32::NEG_INFINITY;
        }
        20.0 * (self.peak_abs as f32 / 32768.0).log10()
    }

    pub fn crest_factor(&self) -> f32 {
        if self.rms <= 0.0 {
            return f32::INFINITY;
        }
        self.peak_abs as f32 / self.rms
    }

    /// Some sample reached full scale.
    pub fn is_clipped(&self) -> bool {
        self.peak_abs >= i16::MAX as i32
    }
}

/// Read a recorded WAV and measure it. Only the studio format is accepted.
pub fn analyze_wav(path: &Path, format: &AudioFormat) -> Result<LevelStats> {
    let mut reader = hound::WavReader::open(path).map_err(|e| StudioError::from_wav(path, e))?;
    let spec = reader.spec();
    if !format.accepts(&spec) {
        return Err(StudioError::FormatMismatch {
            path: path.to_path_buf(),
            detail: format!(
                "{} ch / {} Hz / {} bit",
                spec.channels, spec.sample_rate, spec.bits_per_sample
            ),
        });
    }

    let mut frames: u64 = 0;
    let mut sum_squares: u128 = 0;
    let mut sum_abs: u128 = 0;
    let mut peak_abs: i32 = 0;

    for sample in reader.samples::<i16>() {
        let sample = i32::from(sample.map_err(|e| StudioError::from_wav(path, e))?);
        peak_abs = peak_abs.max(sample.abs());
        sum_squares += sample.pow(2) as u128;
        sum_abs += sample.unsigned_abs() as u128;
        frames += 1;
    }

    let (rms, abs_mean) = if frames > 0 {
        (
            (sum_squares as f64 / frames as f64).sqrt() as f32,
            (sum_abs as f64 / frames as f64) as f32,
        )
    } else {
        (0.0, 0.0)
    };

    let stats = LevelStats {
        frames,
        duration_secs: format.frames_to_secs(frames),
        peak_abs,
        rms,
        abs_mean,
    };

    log::debug!(
        "Levels {:?}: frames={}, duration={:.2}s, peak_abs={}, rms={:.0}, abs_mean={:.0}, crest_factor={:.1}",
        path,
        stats.frames,
        stats.duration_secs,
        stats.peak_abs,
        stats.rms,
        stats.abs_mean,
        stats.crest_factor()
    );

    Ok(stats)
}
