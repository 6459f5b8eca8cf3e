//! Spectrum state and change publisher
//!
//! `SpectrumState` holds the one current `SpectrumSnapshot`. Writers (the
//! analysis and simulation threads) are serialized by a writer lock that is
//! also held while listeners are notified, so every listener sees snapshots
//! in publish order. Readers only take the snapshot `RwLock` long enough to
//! clone it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{Result, VizError};

use super::types::{SnapshotSource, SpectrumSnapshot};

/// Callback invoked with each new snapshot
pub type SpectrumListener = Arc<dyn Fn(SpectrumSnapshot) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Fan-out of snapshot updates to callbacks and channels
pub struct SpectrumPublisher {
    listeners: Mutex<Vec<(SubscriptionId, SpectrumListener)>>,
    channels: Mutex<Vec<Sender<SpectrumSnapshot>>>,
    next_id: AtomicU64,
    panics: AtomicU64,
}

impl Default for SpectrumPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumPublisher {
    /// Create a publisher with no subscribers
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            panics: AtomicU64::new(0),
        }
    }

    /// Register a callback. It runs on the writing thread, so keep it short.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(SpectrumSnapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push((id, Arc::new(callback)));
        }
        id
    }

    /// Remove a callback. Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.listeners.lock() {
            Ok(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(lid, _)| *lid != id);
                listeners.len() != before
            }
            Err(_) => false,
        }
    }

    /// Subscribe via channel. Returns a receiver that will get all future
    /// snapshots; dropping it unsubscribes.
    pub fn subscribe_channel(&self) -> Receiver<SpectrumSnapshot> {
        let (tx, rx) = unbounded();
        if let Ok(mut channels) = self.channels.lock() {
            channels.push(tx);
        }
        rx
    }

    /// Number of live callback + channel subscribers
    pub fn subscriber_count(&self) -> usize {
        let listeners = self.listeners.lock().map(|l| l.len()).unwrap_or(0);
        let channels = self.channels.lock().map(|c| c.len()).unwrap_or(0);
        listeners + channels
    }

    /// Callbacks that panicked so far
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    /// Deliver a snapshot to every subscriber. A panicking callback is
    /// logged and skipped; disconnected channels are removed.
    pub fn notify(&self, snapshot: &SpectrumSnapshot) {
        // Clone the list out so callbacks may (un)subscribe without deadlock
        let listeners: Vec<(SubscriptionId, SpectrumListener)> = match self.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(_) => Vec::new(),
        };

        for (id, listener) in listeners {
            let snap = snapshot.clone();
            if panic::catch_unwind(AssertUnwindSafe(|| listener(snap))).is_err() {
                self.panics.fetch_add(1, Ordering::Relaxed);
                log::warn!("spectrum listener {:?} panicked; continuing", id);
            }
        }

        if let Ok(mut channels) = self.channels.lock() {
            channels.retain(|tx| tx.send(snapshot.clone()).is_ok());
        }
    }
}

/// Writer-side bookkeeping, guarded by the writer lock
struct WriterState {
    sequence: u64,
    last_real_write: Option<Instant>,
}

/// The single shared spectrum snapshot
pub struct SpectrumState {
    bin_count: usize,
    current: RwLock<SpectrumSnapshot>,
    writer: Mutex<WriterState>,
    publisher: SpectrumPublisher,
}

impl SpectrumState {
    /// All-zero state with `bin_count` bins
    pub fn new(bin_count: usize) -> Self {
        Self {
            bin_count,
            current: RwLock::new(SpectrumSnapshot::zeroed(bin_count)),
            writer: Mutex::new(WriterState {
                sequence: 0,
                last_real_write: None,
            }),
            publisher: SpectrumPublisher::new(),
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    pub fn publisher(&self) -> &SpectrumPublisher {
        &self.publisher
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> SpectrumSnapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the snapshot and notify subscribers. Values are clamped to
    /// `[0, 1]` (NaN becomes 0). Returns the new sequence number.
    pub fn write(&self, bins: &[f32], source: SnapshotSource) -> Result<u64> {
        self.check_len(bins)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.publish_locked(&mut writer, bins, source))
    }

    /// Write a simulated snapshot unless the analysis path wrote within
    /// `grace`. Returns whether the write happened.
    pub fn write_fallback(&self, bins: &[f32], grace: Duration) -> Result<bool> {
        self.check_len(bins)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = writer.last_real_write {
            if last.elapsed() < grace {
                return Ok(false);
            }
        }
        self.publish_locked(&mut writer, bins, SnapshotSource::Simulation);
        Ok(true)
    }

    /// Zero the snapshot. Skipped (returns false) when it is already a
    /// silent `Reset` snapshot.
    pub fn reset(&self) -> bool {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        if current.is_silent() && current.source == SnapshotSource::Reset {
            return false;
        }
        let zeros = vec![0.0; self.bin_count];
        self.publish_locked(&mut writer, &zeros, SnapshotSource::Reset);
        true
    }

    fn check_len(&self, bins: &[f32]) -> Result<()> {
        if bins.len() != self.bin_count {
            return Err(VizError::BinCount {
                expected: self.bin_count,
                actual: bins.len(),
            });
        }
        Ok(())
    }

    fn publish_locked(
        &self,
        writer: &mut WriterState,
        bins: &[f32],
        source: SnapshotSource,
    ) -> u64 {
        writer.sequence += 1;
        if source == SnapshotSource::Analysis {
            writer.last_real_write = Some(Instant::now());
        }

        let snapshot = SpectrumSnapshot {
            bins: bins
                .iter()
                .map(|&v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) })
                .collect(),
            sequence: writer.sequence,
            source,
        };

        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = snapshot.clone();
        }

        self.publisher.notify(&snapshot);
        writer.sequence
    }
}
