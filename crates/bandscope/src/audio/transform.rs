//! Windowed spectral transform
//!
//! Hann-windows up to `fft_size` samples of a frame, zero-pads the rest, and
//! runs a forward FFT. The planned FFT, window table, and scratch buffers are
//! owned by one `SpectralTransform` and reused across frames.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::{Result, VizError};

use super::types::AudioFrame;

/// Hann coefficients for a window of `size` samples
pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f32;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / denom).cos()))
        .collect()
}

/// Forward FFT over a fixed-size Hann-windowed buffer
pub struct SpectralTransform {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralTransform {
    /// Plan a forward transform of `fft_size` points.
    pub fn new(fft_size: usize) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            fft_size,
            window: hann_window(fft_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Transform one frame. Returns the full complex output; only the first
    /// `fft_size / 2` entries (up to Nyquist) are meaningful.
    ///
    /// No scaling is applied in the forward direction.
    pub fn process(&mut self, samples: &[f32]) -> Result<&[Complex<f32>]> {
        if samples.is_empty() {
            return Err(VizError::EmptyFrame);
        }

        let used = samples.len().min(self.fft_size);
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            *slot = if i < used {
                Complex::new(samples[i] * self.window[i], 0.0)
            } else {
                Complex::new(0.0, 0.0)
            };
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        Ok(&self.buffer)
    }

    /// Transform a frame and write the magnitudes of the usable half into `out`.
    pub fn magnitudes(&mut self, frame: &AudioFrame, out: &mut Vec<f32>) -> Result<()> {
        let half = self.fft_size / 2;
        let spectrum = self.process(frame.samples())?;
        out.clear();
        out.extend(spectrum[..half].iter().map(|c| c.norm()));
        if out.iter().any(|m| !m.is_finite()) {
            return Err(VizError::InvalidFrame(
                "transform produced non-finite magnitude".to_string(),
            ));
        }
        Ok(())
    }
}
