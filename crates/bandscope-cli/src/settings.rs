//! Pipeline settings for the CLI
//!
//! Optional TOML file with a `[pipeline]` table, overridden by flags.

use std::path::Path;

use bandscope::config::PipelineConfig;
use bandscope::error::{Result, VizError};
use serde::Deserialize;

/// On-disk settings file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub pipeline: PipelineConfig,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| VizError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| VizError::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text)
    }
}

/// Command-line values that take precedence over the file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub bins: Option<usize>,
    pub fft_size: Option<usize>,
    pub band_low: Option<f32>,
    pub band_high: Option<f32>,
}

impl Overrides {
    /// Apply to `config` and validate the result.
    pub fn apply(&self, mut config: PipelineConfig) -> Result<PipelineConfig> {
        if let Some(bins) = self.bins {
            config.analysis.bin_count = bins;
        }
        if let Some(fft) = self.fft_size {
            config.analysis.fft_size = fft;
        }
        if let Some(low) = self.band_low {
            config.analysis.band_low_hz = low;
        }
        if let Some(high) = self.band_high {
            config.analysis.band_high_hz = high;
        }
        config.validate()?;
        Ok(config)
    }
}
