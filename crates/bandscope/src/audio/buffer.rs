//! Bounded frame buffer with drop-oldest backpressure
//!
//! Producers (the playback engine's audio thread, via cloneable `FrameSink`
//! handles) push frames without ever blocking; the analysis thread drains
//! them in submission order.
//!
//! Architecture:
//!   Playback engine → FrameSink::submit (never blocks)
//!                  ↓
//!            FrameBuffer (`VecDeque<AudioFrame>` + Mutex + Condvar)
//!                  ↓ (analysis thread: drain, blocks until frame or close)
//!            SpectralTransform → LogBinner → SpectrumState

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use super::types::AudioFrame;

/// Shared mutable state behind Mutex
struct BufferInner {
    frames: VecDeque<AudioFrame>,
    /// Once set, submissions are ignored and drainers return `None`
    closed: bool,
}

/// Bounded multi-producer / single-consumer frame queue
pub struct FrameBuffer {
    inner: Mutex<BufferInner>,
    frame_available: Condvar,
    capacity: usize,
    submitted: AtomicU64,
    dropped: AtomicU64,
}

impl FrameBuffer {
    /// Create a buffer retaining at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(BufferInner {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            frame_available: Condvar::new(),
            capacity,
            submitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a frame. Never blocks on a full buffer: the oldest retained
    /// frame is discarded to make room. Ignored after `close`.
    pub fn submit(&self, frame: AudioFrame) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => return, // Mutex poisoned
        };
        if inner.closed {
            return;
        }

        self.submitted.fetch_add(1, Ordering::Relaxed);
        if inner.frames.len() >= self.capacity {
            inner.frames.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        inner.frames.push_back(frame);

        drop(inner);
        self.frame_available.notify_one();
    }

    /// Block until a frame is available. Returns `None` once closed.
    pub fn drain(&self) -> Option<AudioFrame> {
        let mut inner = self.inner.lock().ok()?;
        loop {
            if inner.closed {
                return None;
            }
            if let Some(frame) = inner.frames.pop_front() {
                return Some(frame);
            }
            inner = self.frame_available.wait(inner).ok()?;
        }
    }

    /// Pop a frame if one is ready
    pub fn try_drain(&self) -> Option<AudioFrame> {
        let mut inner = self.inner.lock().ok()?;
        if inner.closed {
            return None;
        }
        inner.frames.pop_front()
    }

    /// Close the buffer, discarding retained frames and waking all drainers.
    /// Safe to call more than once.
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.closed = true;
            inner.frames.clear();
        }
        self.frame_available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().map(|inner| inner.closed).unwrap_or(true)
    }

    /// Number of frames currently retained
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.frames.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// (frames submitted, frames discarded by backpressure)
    pub fn counters(&self) -> (u64, u64) {
        (
            self.submitted.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
        )
    }
}

/// Producer-side handle to a pipeline's frame buffer.
///
/// Cheap to clone; hand one to each audio callback.
#[derive(Clone)]
pub struct FrameSink {
    buffer: Arc<FrameBuffer>,
}

impl FrameSink {
    pub fn new(buffer: Arc<FrameBuffer>) -> Self {
        Self { buffer }
    }

    /// Hand a frame to the analysis path without blocking
    pub fn submit(&self, frame: AudioFrame) {
        self.buffer.submit(frame);
    }

    /// True once the owning pipeline has shut down
    pub fn is_closed(&self) -> bool {
        self.buffer.is_closed()
    }
}
