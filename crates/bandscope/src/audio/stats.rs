//! Pipeline statistics
//!
//! `PipelineStats` holds lock-free counters bumped from the analysis and
//! simulation threads; `StatsSnapshot` is the plain copy handed to callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Plain copy of all pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_submitted: u64,
    pub frames_dropped: u64,
    pub frames_analyzed: u64,
    pub frames_skipped: u64,
    pub frame_errors: u64,
    pub simulation_ticks: u64,
    pub simulated_writes: u64,
    pub listener_panics: u64,
}

/// Atomic counters for the background tasks (lock-free)
pub struct PipelineStats {
    frames_analyzed: AtomicU64,
    frames_skipped: AtomicU64,
    frame_errors: AtomicU64,
    simulation_ticks: AtomicU64,
    simulated_writes: AtomicU64,
    started: Instant,
    /// Milliseconds after `started` of the last analysis progress
    last_progress_ms: AtomicU64,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            frames_analyzed: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            frame_errors: AtomicU64::new(0),
            simulation_ticks: AtomicU64::new(0),
            simulated_writes: AtomicU64::new(0),
            started: Instant::now(),
            last_progress_ms: AtomicU64::new(0),
        }
    }

    /// The analysis thread took or finished a frame
    pub fn record_progress(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_progress_ms.fetch_max(now, Ordering::Relaxed);
    }

    /// Time since the last analysis progress (or since creation)
    pub fn since_progress(&self) -> Duration {
        let last = Duration::from_millis(self.last_progress_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }

    /// A frame made it through transform + binning
    pub fn record_analyzed(&self) {
        self.frames_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    /// An empty frame was skipped
    pub fn record_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame failed validation or analysis
    pub fn record_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.simulation_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_simulated_write(&self) {
        self.simulated_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the task-side counters. Buffer and listener counters are filled
    /// in by the pipeline, which owns those structures.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_analyzed: self.frames_analyzed.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            simulation_ticks: self.simulation_ticks.load(Ordering::Relaxed),
            simulated_writes: self.simulated_writes.load(Ordering::Relaxed),
            ..StatsSnapshot::default()
        }
    }
}
