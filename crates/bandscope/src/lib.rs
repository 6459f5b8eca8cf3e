//! Bandscope: real-time spectrum engine
//!
//! Frame buffering, windowed FFT, log-spaced binning, and a synthetic
//! fallback generator for terminal spectrum visualizers.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bandscope::audio::{AudioFrame, PlaybackFlag, SpectrumPipeline};
//! use bandscope::config::PipelineConfig;
//!
//! let playback = PlaybackFlag::new(true);
//! let mut pipeline = SpectrumPipeline::start(PipelineConfig::default(), Arc::new(playback.clone()))?;
//!
//! pipeline.submit(AudioFrame::new(vec![0.0; 2048], 44_100, 1));
//! println!("{:?}", pipeline.current_spectrum().bins);
//!
//! playback.set_playing(false);
//! pipeline.shutdown().into_result()?;
//! # Ok::<(), bandscope::error::VizError>(())
//! ```

pub mod audio;
pub mod config;
pub mod error;
