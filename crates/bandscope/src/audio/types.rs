//! Shared audio types
//!
//! Pure data types used across the spectrum subsystem.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, VizError};

/// A buffer of mono PCM samples handed over by the playback engine.
///
/// Immutable once constructed; multi-channel audio is downmixed by the
/// producer (or via [`AudioFrame::from_interleaved`]).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioFrame {
    /// Wrap already-mono samples
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Average interleaved channels down to mono.
    ///
    /// A trailing partial frame (fewer than `channels` samples) is dropped.
    pub fn from_interleaved(interleaved: &[f32], sample_rate: u32, channels: u16) -> Self {
        let step = channels.max(1) as usize;
        let samples = if step == 1 {
            interleaved.to_vec()
        } else {
            interleaved
                .chunks_exact(step)
                .map(|ch| ch.iter().sum::<f32>() / step as f32)
                .collect()
        };
        Self::new(samples, sample_rate, channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Nyquist frequency in Hz
    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    /// Reject frames the transform cannot analyze
    pub fn check(&self) -> Result<()> {
        if self.samples.is_empty() {
            return Err(VizError::EmptyFrame);
        }
        if self.sample_rate == 0 {
            return Err(VizError::InvalidFrame("sample rate is zero".to_string()));
        }
        if let Some(pos) = self.samples.iter().position(|s| !s.is_finite()) {
            return Err(VizError::InvalidFrame(format!(
                "non-finite sample at index {}",
                pos
            )));
        }
        Ok(())
    }
}

/// Which writer produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotSource {
    /// Initial state or playback-stopped zeroing
    #[default]
    Reset,
    /// Real transform path
    Analysis,
    /// Synthetic fallback
    Simulation,
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotSource::Reset => write!(f, "Reset"),
            SnapshotSource::Analysis => write!(f, "Analysis"),
            SnapshotSource::Simulation => write!(f, "Simulation"),
        }
    }
}

/// A fully-formed spectrum: `bin_count` intensities, each in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumSnapshot {
    pub bins: Vec<f32>,
    /// Publish order, starting at 0 for the initial all-zero state
    pub sequence: u64,
    pub source: SnapshotSource,
}

impl SpectrumSnapshot {
    /// All-zero snapshot with the given bin count
    pub fn zeroed(bin_count: usize) -> Self {
        Self {
            bins: vec![0.0; bin_count],
            sequence: 0,
            source: SnapshotSource::Reset,
        }
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn is_silent(&self) -> bool {
        self.bins.iter().all(|&b| b == 0.0)
    }

    /// Index of the loudest bin (first one on ties)
    pub fn peak_bin(&self) -> Option<usize> {
        self.bins
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((i, v)),
            })
            .map(|(i, _)| i)
    }
}

/// Playback-state query polled once per simulation tick
pub trait PlaybackStatus: Send + Sync {
    fn is_playing(&self) -> bool;
}

impl PlaybackStatus for AtomicBool {
    fn is_playing(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Cloneable playing/not-playing flag the playback engine can flip
#[derive(Debug, Clone, Default)]
pub struct PlaybackFlag(Arc<AtomicBool>);

impl PlaybackFlag {
    pub fn new(playing: bool) -> Self {
        Self(Arc::new(AtomicBool::new(playing)))
    }

    pub fn set_playing(&self, playing: bool) {
        self.0.store(playing, Ordering::Relaxed);
    }

    /// Flip the flag, returning the new value
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::Relaxed)
    }
}

impl PlaybackStatus for PlaybackFlag {
    fn is_playing(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
