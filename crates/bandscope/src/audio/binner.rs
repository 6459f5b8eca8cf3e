//! Logarithmic binner
//!
//! Folds the linear-frequency magnitude spectrum into `bin_count` log-spaced
//! bins between `band_low_hz` and `min(band_high_hz, nyquist)`, then
//! peak-normalizes and log-compresses them into `[0, 1]`.

use crate::config::AnalysisConfig;
use crate::error::{Result, VizError};

/// Maps FFT magnitudes to perceptual bins
pub struct LogBinner {
    bin_count: usize,
    fft_size: usize,
    band_low_hz: f32,
    band_high_hz: f32,
    raw: Vec<f32>,
}

impl LogBinner {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            bin_count: config.bin_count,
            fft_size: config.fft_size,
            band_low_hz: config.band_low_hz,
            band_high_hz: config.band_high_hz,
            raw: vec![0.0; config.bin_count],
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Effective (low, high) band for a sample rate. The ceiling never
    /// exceeds Nyquist.
    pub fn band(&self, sample_rate: u32) -> Result<(f32, f32)> {
        let nyquist = sample_rate as f32 / 2.0;
        let high = self.band_high_hz.min(nyquist);
        if self.band_low_hz >= high {
            return Err(VizError::InvalidFrame(format!(
                "band floor {} Hz is not below ceiling {} Hz at {} Hz sample rate",
                self.band_low_hz, high, sample_rate
            )));
        }
        Ok((self.band_low_hz, high))
    }

    /// Frequency range in Hz covered by bin `index`
    pub fn bin_edges(&self, index: usize, sample_rate: u32) -> Result<(f32, f32)> {
        let (low, high) = self.band(sample_rate)?;
        let log_min = low.log10();
        let log_max = high.log10();
        let step = (log_max - log_min) / self.bin_count as f32;
        let start = 10f32.powf(log_min + step * index as f32);
        let end = 10f32.powf(log_min + step * (index + 1) as f32);
        Ok((start, end))
    }

    /// Half-open FFT index range `[start, end)` averaged into bin `index`.
    /// Always at least one index wide.
    pub fn index_range(&self, index: usize, sample_rate: u32) -> Result<(usize, usize)> {
        let (start_hz, end_hz) = self.bin_edges(index, sample_rate)?;
        let last = self.fft_size / 2 - 1;
        let to_index = |freq: f32| -> usize {
            let idx = (freq * self.fft_size as f32 / sample_rate as f32) as usize;
            idx.min(last)
        };
        let start = to_index(start_hz);
        let end = to_index(end_hz).max(start + 1);
        Ok((start, end))
    }

    /// Bin `magnitudes` (length `fft_size / 2`) into `out`, which is resized
    /// to `bin_count`. Every output value ends up in `[0, 1]`; silence gives
    /// all zeros.
    pub fn bin(&mut self, magnitudes: &[f32], sample_rate: u32, out: &mut Vec<f32>) -> Result<()> {
        let half = self.fft_size / 2;
        if magnitudes.len() < half {
            return Err(VizError::InvalidFrame(format!(
                "expected {} magnitudes, got {}",
                half,
                magnitudes.len()
            )));
        }

        for i in 0..self.bin_count {
            let (start, end) = self.index_range(i, sample_rate)?;
            let slice = &magnitudes[start..end];
            self.raw[i] = slice.iter().sum::<f32>() / slice.len() as f32;
        }

        let max = self.raw.iter().copied().fold(0.0f32, f32::max);
        out.clear();
        out.resize(self.bin_count, 0.0);
        if max <= 0.0 {
            return Ok(());
        }

        for (slot, &raw) in out.iter_mut().zip(&self.raw) {
            *slot = compress(raw / max);
        }
        Ok(())
    }
}

/// `log10(1 + 9v)`: maps 0 → 0 and 1 → 1 while lifting quiet detail.
fn compress(value: f32) -> f32 {
    let v = (1.0 + value * 9.0).log10();
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
