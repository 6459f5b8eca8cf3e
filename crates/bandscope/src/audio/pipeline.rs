//! Spectrum pipeline
//!
//! Owns the frame buffer, the shared spectrum state, and two named
//! background threads:
//!
//! - `spectrum-analysis` drains frames and runs transform → binner → state.
//! - `spectrum-simulation` ticks on its own timer, zeroing the spectrum when
//!   playback stops and filling in synthetic bars when playing without
//!   real data.
//!
//! Writes from both threads go through `SpectrumState`, which serializes
//! them. The simulation thread stays quiet while frames are queued and for
//! a grace window after each real write.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};

use crate::config::pipeline::SHUTDOWN_POLL_MS;
use crate::config::PipelineConfig;
use crate::error::{Result, VizError};

use super::binner::LogBinner;
use super::buffer::{FrameBuffer, FrameSink};
use super::simulation::SimulationGenerator;
use super::state::{SpectrumState, SubscriptionId};
use super::stats::{PipelineStats, StatsSnapshot};
use super::transform::SpectralTransform;
use super::types::{AudioFrame, PlaybackStatus, SnapshotSource, SpectrumSnapshot};

const ANALYSIS_THREAD: &str = "spectrum-analysis";
const SIMULATION_THREAD: &str = "spectrum-simulation";

/// A playback engine that can deliver frames to the pipeline
pub trait AudioSource {
    /// Start sending frames to `sink`. May be called on any thread; the sink
    /// tolerates bursts and never blocks.
    fn attach(&self, sink: FrameSink);
}

/// Outcome of stopping the background threads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Threads still running when the timeout expired (detached)
    pub timed_out: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.timed_out.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(VizError::ShutdownTimeout(self.timed_out))
        }
    }
}

struct Task {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Live spectrum analysis with a synthetic fallback
pub struct SpectrumPipeline {
    config: PipelineConfig,
    buffer: Arc<FrameBuffer>,
    state: Arc<SpectrumState>,
    stats: Arc<PipelineStats>,
    stop_flag: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    tasks: Vec<Task>,
}

impl SpectrumPipeline {
    /// Validate `config` and spawn the background threads.
    ///
    /// `playback` is polled once per simulation tick.
    pub fn start(config: PipelineConfig, playback: Arc<dyn PlaybackStatus>) -> Result<Self> {
        config.validate()?;

        let bin_count = config.analysis.bin_count;
        let (stop_tx, stop_rx) = bounded::<()>(0);

        // Built before spawning so Drop stops whatever did start if a spawn fails
        let mut pipeline = Self {
            buffer: Arc::new(FrameBuffer::new(config.buffer_capacity)),
            state: Arc::new(SpectrumState::new(bin_count)),
            stats: Arc::new(PipelineStats::new()),
            stop_flag: Arc::new(AtomicBool::new(false)),
            stop_tx: Some(stop_tx),
            tasks: Vec::with_capacity(2),
            config,
        };

        // FFT plan and window are built here so the thread only ever runs frames
        let analysis_config = &pipeline.config.analysis;
        let analysis = AnalysisTask {
            transform: SpectralTransform::new(analysis_config.fft_size),
            binner: LogBinner::new(analysis_config),
            magnitudes: Vec::with_capacity(analysis_config.fft_size / 2),
            bins: Vec::with_capacity(bin_count),
            buffer: pipeline.buffer.clone(),
            state: pipeline.state.clone(),
            stats: pipeline.stats.clone(),
            stop_flag: pipeline.stop_flag.clone(),
        };
        pipeline.spawn(ANALYSIS_THREAD, move || analysis.run())?;

        if pipeline.config.simulation_enabled {
            let simulation = SimulationTask {
                generator: SimulationGenerator::new(bin_count),
                interval: pipeline.config.simulation_interval(),
                grace: pipeline.config.real_data_grace(),
                stall: pipeline.config.analysis_stall(),
                buffer: pipeline.buffer.clone(),
                state: pipeline.state.clone(),
                stats: pipeline.stats.clone(),
                stop_flag: pipeline.stop_flag.clone(),
                stop_rx,
                playback,
            };
            pipeline.spawn(SIMULATION_THREAD, move || simulation.run())?;
        }

        log::debug!(
            "spectrum pipeline started: {} bins, fft {}, band {}-{} Hz",
            bin_count,
            pipeline.config.analysis.fft_size,
            pipeline.config.analysis.band_low_hz,
            pipeline.config.analysis.band_high_hz
        );
        Ok(pipeline)
    }

    fn spawn<F>(&mut self, name: &'static str, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|e| VizError::Thread(format!("Failed to spawn {} thread: {}", name, e)))?;
        self.tasks.push(Task { name, handle });
        Ok(())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Producer handle for the frame buffer
    pub fn sink(&self) -> FrameSink {
        FrameSink::new(self.buffer.clone())
    }

    /// Let `source` start delivering frames into this pipeline
    pub fn attach<S: AudioSource + ?Sized>(&self, source: &S) {
        source.attach(self.sink());
    }

    /// Submit a frame directly. Never blocks.
    pub fn submit(&self, frame: AudioFrame) {
        self.buffer.submit(frame);
    }

    /// Copy of the current spectrum; always `bin_count` values in `[0, 1]`
    pub fn current_spectrum(&self) -> SpectrumSnapshot {
        self.state.snapshot()
    }

    /// Register a callback for every snapshot update
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(SpectrumSnapshot) + Send + Sync + 'static,
    {
        self.state.publisher().subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.publisher().unsubscribe(id)
    }

    /// Receive every snapshot update on a channel
    pub fn subscribe_channel(&self) -> Receiver<SpectrumSnapshot> {
        self.state.publisher().subscribe_channel()
    }

    pub fn stats(&self) -> StatsSnapshot {
        let (frames_submitted, frames_dropped) = self.buffer.counters();
        StatsSnapshot {
            frames_submitted,
            frames_dropped,
            listener_panics: self.state.publisher().panic_count(),
            ..self.stats.snapshot()
        }
    }

    /// True until `shutdown` has run
    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Stop both threads and wait up to `shutdown_timeout_ms` for them.
    /// Threads that miss the deadline are detached and listed in the report.
    /// Calling this again is a no-op.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.tasks.is_empty() {
            return ShutdownReport::default();
        }

        self.stop_flag.store(true, Ordering::Relaxed);
        self.buffer.close();
        self.stop_tx.take();

        let deadline = Instant::now() + self.config.shutdown_timeout();
        let poll = Duration::from_millis(SHUTDOWN_POLL_MS);
        let mut timed_out = Vec::new();

        for task in self.tasks.drain(..) {
            while !task.handle.is_finished() && Instant::now() < deadline {
                thread::sleep(poll);
            }
            if task.handle.is_finished() {
                if task.handle.join().is_err() {
                    log::warn!("{} thread panicked", task.name);
                }
            } else {
                log::warn!(
                    "{} thread did not stop within {:?}; detaching",
                    task.name,
                    self.config.shutdown_timeout()
                );
                timed_out.push(task.name.to_string());
            }
        }

        log::debug!("spectrum pipeline stopped");
        ShutdownReport { timed_out }
    }
}

impl Drop for SpectrumPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State moved onto the analysis thread. Scratch buffers live and die
/// with it.
struct AnalysisTask {
    transform: SpectralTransform,
    binner: LogBinner,
    magnitudes: Vec<f32>,
    bins: Vec<f32>,
    buffer: Arc<FrameBuffer>,
    state: Arc<SpectrumState>,
    stats: Arc<PipelineStats>,
    stop_flag: Arc<AtomicBool>,
}

impl AnalysisTask {
    fn run(mut self) {
        while let Some(frame) = self.buffer.drain() {
            if self.stop_flag.load(Ordering::Relaxed) {
                break;
            }
            self.stats.record_progress();

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(&frame)));
            match outcome {
                Ok(Ok(())) => self.stats.record_analyzed(),
                Ok(Err(VizError::EmptyFrame)) => {
                    log::debug!("skipping empty frame");
                    self.stats.record_skipped();
                }
                Ok(Err(e)) => {
                    log::warn!("skipping frame: {}", e);
                    self.stats.record_error();
                }
                Err(_) => {
                    log::warn!("frame analysis panicked; continuing");
                    self.stats.record_error();
                }
            }
            self.stats.record_progress();
        }

        log::debug!("{} thread exiting", ANALYSIS_THREAD);
    }

    fn process(&mut self, frame: &AudioFrame) -> Result<()> {
        frame.check()?;
        self.transform.magnitudes(frame, &mut self.magnitudes)?;
        self.binner
            .bin(&self.magnitudes, frame.sample_rate(), &mut self.bins)?;
        self.state.write(&self.bins, SnapshotSource::Analysis)?;
        Ok(())
    }
}

/// State moved onto the simulation thread
struct SimulationTask {
    generator: SimulationGenerator,
    interval: Duration,
    grace: Duration,
    stall: Duration,
    buffer: Arc<FrameBuffer>,
    state: Arc<SpectrumState>,
    stats: Arc<PipelineStats>,
    stop_flag: Arc<AtomicBool>,
    stop_rx: Receiver<()>,
    playback: Arc<dyn PlaybackStatus>,
}

impl SimulationTask {
    fn run(mut self) {
        let ticker = tick(self.interval);
        let started = Instant::now();
        let mut bins = Vec::with_capacity(self.generator.bin_count());

        loop {
            select! {
                recv(self.stop_rx) -> _ => break,
                recv(ticker) -> _ => {}
            }
            if self.stop_flag.load(Ordering::Relaxed) {
                break;
            }

            self.stats.record_tick();
            let elapsed = started.elapsed().as_secs_f32();
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| self.tick(elapsed, &mut bins)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("simulation tick failed: {}", e),
                Err(_) => log::warn!("simulation tick panicked; continuing"),
            }
        }

        log::debug!("{} thread exiting", SIMULATION_THREAD);
    }

    fn tick(&mut self, elapsed_secs: f32, bins: &mut Vec<f32>) -> Result<()> {
        if !self.playback.is_playing() {
            self.state.reset();
            return Ok(());
        }
        // Queued frames win only while analysis is keeping up with them
        if !self.buffer.is_empty() && self.stats.since_progress() < self.stall {
            return Ok(());
        }

        self.generator.generate(elapsed_secs, bins);
        if self.state.write_fallback(bins.as_slice(), self.grace)? {
            self.stats.record_simulated_write();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::PlaybackFlag;
    use crate::config::AnalysisConfig;
    use std::f32::consts::PI;
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex;

    fn wait_until(timeout_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn analysis_only() -> PipelineConfig {
        PipelineConfig {
            simulation_enabled: false,
            ..Default::default()
        }
    }

    fn fast_simulation(grace_ms: u64) -> PipelineConfig {
        PipelineConfig {
            simulation_interval_ms: 10,
            real_data_grace_ms: grace_ms,
            ..Default::default()
        }
    }

    fn start(config: PipelineConfig, playing: bool) -> (SpectrumPipeline, PlaybackFlag) {
        let flag = PlaybackFlag::new(playing);
        let pipeline = SpectrumPipeline::start(config, Arc::new(flag.clone())).unwrap();
        (pipeline, flag)
    }

    fn tone(freq: f32, sample_rate: u32, len: usize) -> AudioFrame {
        let samples = (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.8)
            .collect();
        AudioFrame::new(samples, sample_rate, 1)
    }

    // --- Construction ---

    #[test]
    fn rejects_inverted_band() {
        let config = PipelineConfig {
            analysis: AnalysisConfig {
                band_low_hz: 9000.0,
                band_high_hz: 100.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = SpectrumPipeline::start(config, Arc::new(PlaybackFlag::new(false)));
        assert!(matches!(result, Err(VizError::Config(_))));
    }

    #[test]
    fn oversized_fft_fails_at_start() {
        let config = PipelineConfig {
            analysis: AnalysisConfig {
                fft_size: 1usize << (usize::BITS - 1),
                ..Default::default()
            },
            ..Default::default()
        };
        let result = SpectrumPipeline::start(config, Arc::new(PlaybackFlag::new(true)));
        assert!(matches!(result, Err(VizError::Config(_))));
    }

    #[test]
    fn initial_spectrum_is_zeroed() {
        let (pipeline, _) = start(analysis_only(), false);
        let snap = pipeline.current_spectrum();
        assert_eq!(snap.len(), 24);
        assert!(snap.is_silent());
        assert!(pipeline.is_running());
    }

    #[test]
    fn custom_bin_count_respected() {
        let config = PipelineConfig {
            analysis: AnalysisConfig {
                bin_count: 7,
                ..Default::default()
            },
            ..fast_simulation(0)
        };
        let (pipeline, _) = start(config, true);
        let rx = pipeline.subscribe_channel();
        let snap = rx.recv_timeout(Duration::from_secs(2)).expect("simulated update");
        assert_eq!(snap.len(), 7);
        assert!(snap.bins.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(pipeline.current_spectrum().len(), 7);
    }

    // --- Analysis path ---

    #[test]
    fn silence_yields_zero_snapshot() {
        let (pipeline, _) = start(analysis_only(), true);
        let rx = pipeline.subscribe_channel();
        pipeline.submit(AudioFrame::new(vec![0.0; 2048], 44100, 1));

        let snap = rx.recv_timeout(Duration::from_secs(2)).expect("analysis update");
        assert_eq!(snap.source, SnapshotSource::Analysis);
        assert!(snap.is_silent());
        assert_eq!(pipeline.stats().frames_analyzed, 1);
    }

    #[test]
    fn tone_peaks_in_matching_bin() {
        let (pipeline, _) = start(analysis_only(), true);
        let rx = pipeline.subscribe_channel();
        pipeline.submit(tone(1000.0, 44100, 2048));

        let snap = rx.recv_timeout(Duration::from_secs(2)).expect("analysis update");
        let peak = snap.peak_bin().unwrap();
        let binner = LogBinner::new(&pipeline.config().analysis);
        let (low, high) = binner.bin_edges(peak, 44100).unwrap();
        assert!(low <= 1000.0 && 1000.0 < high, "peak bin {} = {}-{} Hz", peak, low, high);
        assert!((snap.bins[peak] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_frame_is_skipped() {
        let (pipeline, _) = start(analysis_only(), true);
        pipeline.submit(tone(440.0, 44100, 2048));
        assert!(wait_until(2000, || pipeline.stats().frames_analyzed == 1));
        let before = pipeline.current_spectrum();

        pipeline.submit(AudioFrame::new(Vec::new(), 44100, 1));
        assert!(wait_until(2000, || pipeline.stats().frames_skipped == 1));
        assert_eq!(pipeline.current_spectrum(), before);
    }

    #[test]
    fn bad_frame_does_not_stop_analysis() {
        let (pipeline, _) = start(analysis_only(), true);
        pipeline.submit(AudioFrame::new(vec![0.5; 512], 0, 1));
        pipeline.submit(AudioFrame::new(vec![f32::INFINITY; 512], 44100, 1));
        // Nyquist of 20 Hz sits at the 20 Hz floor
        pipeline.submit(AudioFrame::new(vec![0.5; 512], 40, 1));
        pipeline.submit(tone(440.0, 44100, 2048));

        assert!(wait_until(2000, || pipeline.stats().frames_analyzed == 1));
        assert_eq!(pipeline.stats().frame_errors, 3);
        assert!(!pipeline.current_spectrum().is_silent());
    }

    #[test]
    fn burst_never_blocks_and_accounts_for_every_frame() {
        let (pipeline, _) = start(analysis_only(), true);
        let start_at = Instant::now();
        for i in 0..20 {
            pipeline.submit(tone(200.0 + i as f32 * 50.0, 44100, 2048));
        }
        assert!(start_at.elapsed() < Duration::from_secs(1));

        assert!(wait_until(3000, || {
            let s = pipeline.stats();
            s.frames_analyzed + s.frames_dropped == 20
        }));
        assert_eq!(pipeline.stats().frames_submitted, 20);
    }

    #[test]
    fn frames_processed_in_submission_order() {
        let (pipeline, _) = start(analysis_only(), true);
        let peaks = Arc::new(Mutex::new(Vec::new()));
        let peaks_cb = peaks.clone();
        pipeline.subscribe(move |snap| {
            peaks_cb.lock().unwrap().push(snap.peak_bin().unwrap_or(0));
        });

        // Rising tones: processed peaks must never go backwards
        for freq in [100.0, 400.0, 1600.0, 6400.0] {
            pipeline.submit(tone(freq, 44100, 2048));
        }
        assert!(wait_until(3000, || {
            let s = pipeline.stats();
            s.frames_analyzed + s.frames_dropped == 4
        }));

        let peaks = peaks.lock().unwrap();
        assert!(!peaks.is_empty());
        assert!(peaks.windows(2).all(|w| w[0] <= w[1]), "peaks {:?}", *peaks);
    }

    // --- Simulation path ---

    #[test]
    fn stopped_playback_zeroes_within_a_tick() {
        let (pipeline, _) = start(fast_simulation(0), false);
        let rx = pipeline.subscribe_channel();
        pipeline.submit(tone(1000.0, 44100, 2048));

        let first = rx.recv_timeout(Duration::from_secs(2)).expect("analysis update");
        assert_eq!(first.source, SnapshotSource::Analysis);
        assert!(!first.is_silent());

        let next = rx.recv_timeout(Duration::from_millis(200)).expect("reset");
        assert_eq!(next.source, SnapshotSource::Reset);
        assert!(next.is_silent());
        assert!(pipeline.current_spectrum().is_silent());
    }

    #[test]
    fn stopped_playback_does_not_republish_zeros() {
        let (pipeline, _) = start(fast_simulation(0), false);
        let rx = pipeline.subscribe_channel();
        assert!(wait_until(2000, || pipeline.stats().simulation_ticks >= 5));
        assert!(rx.try_recv().is_err());
        assert!(pipeline.current_spectrum().is_silent());
    }

    #[test]
    fn playing_without_frames_simulates_bass_heavy_bars() {
        let (pipeline, _) = start(fast_simulation(0), true);
        let rx = pipeline.subscribe_channel();

        let mut low = 0.0f32;
        let mut high = 0.0f32;
        for _ in 0..40 {
            let snap = rx.recv_timeout(Duration::from_secs(2)).expect("simulated update");
            assert_eq!(snap.source, SnapshotSource::Simulation);
            low += snap.bins[..6].iter().sum::<f32>();
            high += snap.bins[18..].iter().sum::<f32>();
        }
        assert!(low > high, "low {} should exceed high {}", low, high);
        assert!(pipeline.stats().simulated_writes >= 40);
    }

    #[test]
    fn real_data_suppresses_simulation() {
        let (pipeline, _) = start(fast_simulation(10_000), true);
        let rx = pipeline.subscribe_channel();
        pipeline.submit(tone(1000.0, 44100, 2048));

        let real_seq = loop {
            let snap = rx.recv_timeout(Duration::from_secs(2)).expect("update");
            if snap.source == SnapshotSource::Analysis {
                break snap.sequence;
            }
        };

        thread::sleep(Duration::from_millis(150));
        let later: Vec<SpectrumSnapshot> = rx.try_iter().collect();
        assert!(
            later.iter().all(|s| s.source != SnapshotSource::Simulation),
            "simulation wrote after real data at seq {}",
            real_seq
        );
        assert_eq!(pipeline.current_spectrum().source, SnapshotSource::Analysis);
    }

    #[test]
    fn pause_then_resume() {
        let (pipeline, flag) = start(fast_simulation(0), true);
        assert!(wait_until(2000, || !pipeline.current_spectrum().is_silent()));
        flag.set_playing(false);
        assert!(wait_until(500, || pipeline.current_spectrum().is_silent()));
        flag.set_playing(true);
        assert!(wait_until(500, || pipeline.current_spectrum().source
            == SnapshotSource::Simulation));
    }

    /// Panics on every other query
    struct FlakyStatus {
        calls: AtomicU64,
    }

    impl PlaybackStatus for FlakyStatus {
        fn is_playing(&self) -> bool {
            if self.calls.fetch_add(1, Ordering::Relaxed) % 2 == 1 {
                panic!("playback status unavailable");
            }
            true
        }
    }

    #[test]
    fn panicking_tick_does_not_stop_simulation() {
        let status = Arc::new(FlakyStatus {
            calls: AtomicU64::new(0),
        });
        let mut pipeline = SpectrumPipeline::start(fast_simulation(0), status).unwrap();

        assert!(wait_until(2000, || pipeline.stats().simulation_ticks >= 10));
        let first = pipeline.stats();
        assert!(first.simulated_writes >= 1);
        assert!(first.simulated_writes < first.simulation_ticks);

        assert!(wait_until(2000, || {
            let s = pipeline.stats();
            s.simulation_ticks >= first.simulation_ticks + 10
                && s.simulated_writes > first.simulated_writes
        }));
        assert!(pipeline.shutdown().is_clean());
    }

    fn idle_simulation(buffer: Arc<FrameBuffer>, stall_ms: u64) -> SimulationTask {
        let (_stop_tx, stop_rx) = bounded(0);
        SimulationTask {
            generator: SimulationGenerator::with_seed(8, 3),
            interval: Duration::from_millis(10),
            grace: Duration::ZERO,
            stall: Duration::from_millis(stall_ms),
            buffer,
            state: Arc::new(SpectrumState::new(8)),
            stats: Arc::new(PipelineStats::new()),
            stop_flag: Arc::new(AtomicBool::new(false)),
            stop_rx,
            playback: Arc::new(PlaybackFlag::new(true)),
        }
    }

    #[test]
    fn queued_frames_hold_off_simulation_while_analysis_progresses() {
        let buffer = Arc::new(FrameBuffer::new(4));
        buffer.submit(tone(440.0, 44100, 1024));
        let mut task = idle_simulation(buffer, 10_000);
        let mut bins = Vec::new();

        task.tick(0.0, &mut bins).unwrap();
        assert_eq!(task.state.snapshot().sequence, 0);
        assert_eq!(task.stats.snapshot().simulated_writes, 0);
    }

    #[test]
    fn stalled_analysis_falls_back_to_simulation() {
        let buffer = Arc::new(FrameBuffer::new(4));
        buffer.submit(tone(440.0, 44100, 1024));
        let mut task = idle_simulation(buffer.clone(), 30);
        let mut bins = Vec::new();

        task.tick(0.0, &mut bins).unwrap();
        assert_eq!(task.state.snapshot().sequence, 0);

        // Nothing drains the buffer: analysis is stuck
        thread::sleep(Duration::from_millis(60));
        task.tick(0.1, &mut bins).unwrap();
        let snap = task.state.snapshot();
        assert_eq!(snap.source, SnapshotSource::Simulation);
        assert_eq!(task.stats.snapshot().simulated_writes, 1);
        assert!(!buffer.is_empty());

        // Fresh progress holds it off again
        task.stats.record_progress();
        task.tick(0.2, &mut bins).unwrap();
        assert_eq!(task.stats.snapshot().simulated_writes, 1);
    }

    // --- Subscribers ---

    #[test]
    fn unsubscribe_through_pipeline() {
        let (pipeline, _) = start(analysis_only(), true);
        let count = Arc::new(Mutex::new(0u32));
        let count_cb = count.clone();
        let id = pipeline.subscribe(move |_| *count_cb.lock().unwrap() += 1);

        pipeline.submit(tone(300.0, 44100, 1024));
        assert!(wait_until(2000, || *count.lock().unwrap() == 1));
        assert!(pipeline.unsubscribe(id));

        pipeline.submit(tone(300.0, 44100, 1024));
        assert!(wait_until(2000, || pipeline.stats().frames_analyzed == 2));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn panicking_listener_keeps_pipeline_alive() {
        let (pipeline, _) = start(analysis_only(), true);
        pipeline.subscribe(|_| panic!("renderer crashed"));
        pipeline.submit(tone(300.0, 44100, 1024));
        pipeline.submit(tone(600.0, 44100, 1024));
        assert!(wait_until(2000, || pipeline.stats().frames_analyzed == 2));
        assert_eq!(pipeline.stats().listener_panics, 2);
    }

    // --- Attach ---

    struct FakeEngine {
        sink: Mutex<Option<FrameSink>>,
    }

    impl AudioSource for FakeEngine {
        fn attach(&self, sink: FrameSink) {
            *self.sink.lock().unwrap() = Some(sink);
        }
    }

    #[test]
    fn attached_source_feeds_pipeline() {
        let (pipeline, _) = start(analysis_only(), true);
        let engine = FakeEngine {
            sink: Mutex::new(None),
        };
        pipeline.attach(&engine);

        let sink = engine.sink.lock().unwrap().clone().expect("attached");
        sink.submit(tone(2000.0, 48000, 2048));
        assert!(wait_until(2000, || pipeline.stats().frames_analyzed == 1));
    }

    #[test]
    fn sink_closed_after_shutdown() {
        let (mut pipeline, _) = start(analysis_only(), true);
        let sink = pipeline.sink();
        assert!(!sink.is_closed());
        assert!(pipeline.shutdown().is_clean());
        assert!(sink.is_closed());
        sink.submit(tone(100.0, 44100, 512));
        assert_eq!(pipeline.stats().frames_submitted, 0);
    }

    // --- Shutdown ---

    #[test]
    fn shutdown_is_idempotent() {
        let (mut pipeline, _) = start(PipelineConfig::default(), true);
        let first = pipeline.shutdown();
        assert!(first.is_clean());
        assert!(!pipeline.is_running());
        let second = pipeline.shutdown();
        assert!(second.is_clean());
        assert!(second.into_result().is_ok());
    }

    #[test]
    fn shutdown_is_prompt() {
        let config = PipelineConfig {
            simulation_interval_ms: 1000,
            ..Default::default()
        };
        let (mut pipeline, _) = start(config, true);
        let started = Instant::now();
        assert!(pipeline.shutdown().is_clean());
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn drop_stops_threads() {
        let (pipeline, _) = start(fast_simulation(0), true);
        let sink = pipeline.sink();
        drop(pipeline);
        assert!(sink.is_closed());
    }

    #[test]
    fn stuck_listener_reports_timeout() {
        let config = PipelineConfig {
            shutdown_timeout_ms: 50,
            ..analysis_only()
        };
        let (mut pipeline, _) = start(config, true);
        let (entered_tx, entered_rx) = bounded::<()>(1);
        pipeline.subscribe(move |_| {
            let _ = entered_tx.try_send(());
            thread::sleep(Duration::from_millis(400));
        });

        pipeline.submit(tone(500.0, 44100, 1024));
        entered_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("listener entered");

        let report = pipeline.shutdown();
        assert_eq!(report.timed_out, vec![ANALYSIS_THREAD.to_string()]);
        assert!(matches!(
            report.into_result(),
            Err(VizError::ShutdownTimeout(_))
        ));
        assert!(pipeline.shutdown().is_clean());
    }
}
