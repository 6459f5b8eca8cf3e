//! Synthetic playback engine
//!
//! Stands in for a real decoder + output device: generates a stereo test
//! signal in real time on its own thread and feeds it through a `TapSource`
//! into whichever pipeline it is attached to.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bandscope::audio::{AudioSource, FrameSink, PlaybackFlag, PlaybackStatus, TapSource};

/// Output sample rate of the synthetic engine
pub const SAMPLE_RATE: u32 = 44_100;

/// Interleaved output channels
pub const CHANNELS: u16 = 2;

/// Stereo frames "played" per device callback
const CALLBACK_FRAMES: usize = 1024;

/// Length of one logarithmic sweep cycle
const SWEEP_SECS: u64 = 8;
const SWEEP_LOW_HZ: f32 = 60.0;
const SWEEP_HIGH_HZ: f32 = 8000.0;

/// What the engine plays
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Tone(f32),
    Sweep,
}

/// Frequency of the sweep `t` seconds into a cycle
pub fn sweep_freq(t: f32) -> f32 {
    let progress = (t / SWEEP_SECS as f32).clamp(0.0, 1.0);
    SWEEP_LOW_HZ * (SWEEP_HIGH_HZ / SWEEP_LOW_HZ).powf(progress)
}

/// Endless interleaved stereo samples for `signal`
pub fn signal_samples(signal: Signal, sample_rate: u32) -> impl Iterator<Item = f32> {
    let sr = sample_rate as f32;
    let cycle = SWEEP_SECS * sample_rate as u64;
    (0u64..)
        .scan(0.0f32, move |phase, n| {
            let freq = match signal {
                Signal::Tone(f) => f,
                Signal::Sweep => sweep_freq((n % cycle) as f32 / sr),
            };
            *phase = (*phase + 2.0 * PI * freq / sr) % (2.0 * PI);
            let s = 0.6 * phase.sin() + 0.2 * (2.0 * *phase).sin();
            Some([s, s * 0.9])
        })
        .flatten()
}

/// Real-time test signal source
pub struct SyntheticEngine {
    signal: Signal,
    frame_len: usize,
    playback: PlaybackFlag,
    producing: Arc<AtomicBool>,
    stop_flag: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl SyntheticEngine {
    /// `frame_len` is the mono frame size handed to the pipeline (usually
    /// the FFT size).
    pub fn new(signal: Signal, frame_len: usize, playback: PlaybackFlag, producing: bool) -> Self {
        Self {
            signal,
            frame_len,
            playback,
            producing: Arc::new(AtomicBool::new(producing)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn is_producing(&self) -> bool {
        self.producing.load(Ordering::Relaxed)
    }

    /// Flip whether frames reach the sink, returning the new value
    pub fn toggle_producing(&self) -> bool {
        !self.producing.fetch_xor(true, Ordering::Relaxed)
    }

    /// Stop and join every playback thread
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Ok(mut threads) = self.threads.lock() {
            for handle in threads.drain(..) {
                let _ = handle.join();
            }
        }
    }

    fn play_loop(
        signal: Signal,
        frame_len: usize,
        sink: FrameSink,
        playback: PlaybackFlag,
        producing: Arc<AtomicBool>,
        stop_flag: Arc<AtomicBool>,
    ) {
        let mut tap = TapSource::new(
            signal_samples(signal, SAMPLE_RATE),
            sink.clone(),
            CHANNELS,
            SAMPLE_RATE,
            frame_len,
        );
        let mut untapped = signal_samples(signal, SAMPLE_RATE);
        let callback = Duration::from_secs_f64(CALLBACK_FRAMES as f64 / SAMPLE_RATE as f64);
        let samples_per_callback = CALLBACK_FRAMES * CHANNELS as usize;

        while !stop_flag.load(Ordering::Relaxed) && !sink.is_closed() {
            if !playback.is_playing() {
                thread::sleep(callback);
                continue;
            }

            // "Device" consumes one callback's worth of samples
            let played = if producing.load(Ordering::Relaxed) {
                tap.by_ref().take(samples_per_callback).count()
            } else {
                untapped.by_ref().take(samples_per_callback).count()
            };
            log::trace!("played {} samples", played);
            thread::sleep(callback);
        }

        log::debug!("synthetic engine stopped");
    }
}

impl AudioSource for SyntheticEngine {
    fn attach(&self, sink: FrameSink) {
        let signal = self.signal;
        let frame_len = self.frame_len;
        let playback = self.playback.clone();
        let producing = self.producing.clone();
        let stop_flag = self.stop_flag.clone();

        let spawned = thread::Builder::new()
            .name("synthetic-engine".to_string())
            .spawn(move || Self::play_loop(signal, frame_len, sink, playback, producing, stop_flag));

        match spawned {
            Ok(handle) => {
                if let Ok(mut threads) = self.threads.lock() {
                    threads.push(handle);
                }
            }
            Err(e) => log::error!("Failed to spawn engine thread: {}", e),
        }
    }
}

impl Drop for SyntheticEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
