//! Configuration for the spectrum engine
//!
//! Compile-time defaults grouped by concern, plus the per-pipeline
//! `AnalysisConfig` / `PipelineConfig` that are fixed at construction.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, VizError};

/// Spectral analysis defaults
pub mod analysis {
    /// FFT window size (must be a power of two)
    pub const FFT_SIZE: usize = 2048;

    /// Largest accepted FFT window
    pub const MAX_FFT_SIZE: usize = 1 << 16;

    /// Number of output bins in a spectrum snapshot
    pub const SPECTRUM_BINS: usize = 24;

    /// Lowest analyzed frequency in Hz
    pub const BAND_LOW_HZ: f32 = 20.0;

    /// Highest analyzed frequency in Hz (capped at Nyquist per frame)
    pub const BAND_HIGH_HZ: f32 = 20_000.0;
}

/// Pipeline scheduling defaults
pub mod pipeline {
    /// Frames retained before the oldest is dropped
    pub const FRAME_BUFFER_CAPACITY: usize = 10;

    /// Simulation tick interval in milliseconds (~20 ticks/s)
    pub const SIMULATION_INTERVAL_MS: u64 = 50;

    /// After a real-data write, simulation stays quiet for this long
    pub const REAL_DATA_GRACE_MS: u64 = 250;

    /// Queued frames only hold off the simulation while the analysis thread
    /// has taken or finished a frame within this window
    pub const ANALYSIS_STALL_MS: u64 = 500;

    /// Upper bound on waiting for background tasks during shutdown
    pub const SHUTDOWN_TIMEOUT_MS: u64 = 1000;

    /// Poll interval while waiting for tasks to finish
    pub const SHUTDOWN_POLL_MS: u64 = 5;
}

/// Synthetic spectrum shape
pub mod simulation {
    /// Floor added to every bin
    pub const BASE_LEVEL: f32 = 0.12;

    /// Extra level at bin 0, decaying linearly to zero at the last bin
    pub const BASS_WEIGHT: f32 = 0.45;

    /// (amplitude, temporal rate in rad/s, per-bin phase step) for each wave
    pub const WAVES: [(f32, f32, f32); 3] = [(0.15, 3.1, 0.45), (0.10, 5.3, 0.9), (0.06, 8.7, 1.7)];

    /// Maximum absolute random perturbation per bin
    pub const JITTER: f32 = 0.05;
}

/// Parameters for one analysis path. Immutable once a pipeline is built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub bin_count: usize,
    pub fft_size: usize,
    pub band_low_hz: f32,
    pub band_high_hz: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bin_count: analysis::SPECTRUM_BINS,
            fft_size: analysis::FFT_SIZE,
            band_low_hz: analysis::BAND_LOW_HZ,
            band_high_hz: analysis::BAND_HIGH_HZ,
        }
    }
}

impl AnalysisConfig {
    /// Check the invariants the transform and binner rely on.
    pub fn validate(&self) -> Result<()> {
        if self.bin_count == 0 {
            return Err(VizError::Config("bin_count must be at least 1".to_string()));
        }
        if self.fft_size < 4 || !self.fft_size.is_power_of_two() {
            return Err(VizError::Config(format!(
                "fft_size must be a power of two >= 4, got {}",
                self.fft_size
            )));
        }
        if self.fft_size > analysis::MAX_FFT_SIZE {
            return Err(VizError::Config(format!(
                "fft_size must be at most {}, got {}",
                analysis::MAX_FFT_SIZE,
                self.fft_size
            )));
        }
        if !self.band_low_hz.is_finite() || !self.band_high_hz.is_finite() {
            return Err(VizError::Config("band edges must be finite".to_string()));
        }
        if self.band_low_hz <= 0.0 {
            return Err(VizError::Config(format!(
                "band_low_hz must be positive, got {}",
                self.band_low_hz
            )));
        }
        if self.band_low_hz >= self.band_high_hz {
            return Err(VizError::Config(format!(
                "band_low_hz ({}) must be below band_high_hz ({})",
                self.band_low_hz, self.band_high_hz
            )));
        }
        Ok(())
    }
}

/// Full pipeline configuration, supplied once at construction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub analysis: AnalysisConfig,
    pub buffer_capacity: usize,
    pub simulation_interval_ms: u64,
    pub real_data_grace_ms: u64,
    pub analysis_stall_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub simulation_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            buffer_capacity: pipeline::FRAME_BUFFER_CAPACITY,
            simulation_interval_ms: pipeline::SIMULATION_INTERVAL_MS,
            real_data_grace_ms: pipeline::REAL_DATA_GRACE_MS,
            analysis_stall_ms: pipeline::ANALYSIS_STALL_MS,
            shutdown_timeout_ms: pipeline::SHUTDOWN_TIMEOUT_MS,
            simulation_enabled: true,
        }
    }
}

impl PipelineConfig {
    /// Validate the analysis parameters and the scheduling knobs.
    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        if self.buffer_capacity == 0 {
            return Err(VizError::Config(
                "buffer_capacity must be at least 1".to_string(),
            ));
        }
        if self.simulation_interval_ms == 0 {
            return Err(VizError::Config(
                "simulation_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn simulation_interval(&self) -> Duration {
        Duration::from_millis(self.simulation_interval_ms)
    }

    pub fn real_data_grace(&self) -> Duration {
        Duration::from_millis(self.real_data_grace_ms)
    }

    pub fn analysis_stall(&self) -> Duration {
        Duration::from_millis(self.analysis_stall_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
