//! Bandscope CLI: terminal spectrum visualizer demo

mod engine;
mod settings;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::widgets::*;

use bandscope::audio::{PlaybackFlag, PlaybackStatus, SnapshotSource, SpectrumPipeline, StatsSnapshot};
use bandscope::config::PipelineConfig;

use engine::{Signal, SyntheticEngine};
use settings::{FileConfig, Overrides};

#[derive(Parser)]
#[command(name = "bandscope", about = "Terminal audio spectrum visualizer", version)]
struct Cli {
    /// Number of spectrum bars
    #[arg(long)]
    bins: Option<usize>,

    /// FFT window size (power of two)
    #[arg(long)]
    fft_size: Option<usize>,

    /// Lowest analyzed frequency in Hz
    #[arg(long)]
    band_low: Option<f32>,

    /// Highest analyzed frequency in Hz
    #[arg(long)]
    band_high: Option<f32>,

    /// Play a steady tone at this frequency instead of a sweep
    #[arg(long, value_name = "HZ")]
    tone: Option<f32>,

    /// Start with the producer muted (simulated spectrum only)
    #[arg(long)]
    silent: bool,

    /// TOML file with a [pipeline] table
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write logs to this file (logging is off otherwise)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            bins: self.bins,
            fft_size: self.fft_size,
            band_low: self.band_low,
            band_high: self.band_high,
        }
    }

    fn signal(&self) -> Signal {
        match self.tone {
            Some(hz) => Signal::Tone(hz),
            None => Signal::Sweep,
        }
    }
}

struct App {
    spectrum: Vec<u64>,
    source: SnapshotSource,
    sequence: u64,
    stats: StatsSnapshot,
    signal: Signal,
    playing: bool,
    producing: bool,
    running: bool,
}

impl App {
    fn new(bin_count: usize, signal: Signal, producing: bool) -> Self {
        Self {
            spectrum: vec![0; bin_count],
            source: SnapshotSource::Reset,
            sequence: 0,
            stats: StatsSnapshot::default(),
            signal,
            playing: true,
            producing,
            running: true,
        }
    }

    fn update(&mut self, pipeline: &SpectrumPipeline) {
        let snapshot = pipeline.current_spectrum();
        self.spectrum = scale_bins(&snapshot.bins);
        self.source = snapshot.source;
        self.sequence = snapshot.sequence;
        self.stats = pipeline.stats();
    }
}

/// Map normalized bins onto the 0-100 bar range
fn scale_bins(bins: &[f32]) -> Vec<u64> {
    bins.iter()
        .map(|v| (v.clamp(0.0, 1.0) * 100.0).round() as u64)
        .collect()
}

fn init_logging(path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn load_config(cli: &Cli) -> bandscope::error::Result<PipelineConfig> {
    let base = match &cli.config {
        Some(path) => FileConfig::load(path)?.pipeline,
        None => PipelineConfig::default(),
    };
    cli.overrides().apply(base)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(path) = &cli.log_file {
        init_logging(path)?;
    }

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let playback = PlaybackFlag::new(true);
    let mut pipeline = match SpectrumPipeline::start(config.clone(), Arc::new(playback.clone())) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Pipeline error: {}", e);
            std::process::exit(1);
        }
    };

    let engine = SyntheticEngine::new(
        cli.signal(),
        config.analysis.fft_size,
        playback.clone(),
        !cli.silent,
    );
    pipeline.attach(&engine);
    log::info!("Playing {:?} ({} bins)", engine.signal(), config.analysis.bin_count);

    let mut app = App::new(config.analysis.bin_count, engine.signal(), engine.is_producing());

    // Enter TUI
    terminal::enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let tick_rate = Duration::from_millis(33); // ~30fps
    let mut last_tick = Instant::now();

    while app.running {
        terminal.draw(|f| draw_ui(f, &app))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => {
                            app.running = false;
                        }
                        KeyCode::Char(' ') => {
                            app.playing = playback.toggle();
                            log::info!("Playback {}", if app.playing { "resumed" } else { "paused" });
                        }
                        KeyCode::Char('s') => {
                            app.producing = engine.toggle_producing();
                            log::info!("Producer {}", if app.producing { "on" } else { "off" });
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
            app.playing = playback.is_playing();
            app.update(&pipeline);
        }
    }

    // Restore terminal
    terminal::disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;

    engine.stop();
    let report = pipeline.shutdown();
    if !report.is_clean() {
        log::warn!("Tasks did not stop in time: {:?}", report.timed_out);
        eprintln!("Warning: background tasks did not stop in time: {}", report.timed_out.join(", "));
    }

    Ok(())
}

fn draw_ui(f: &mut Frame, app: &App) {
    let area = f.area();

    let outer = Block::default()
        .title(format!(" Bandscope v{} ", env!("CARGO_PKG_VERSION")))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded);
    let inner = outer.inner(area);
    f.render_widget(outer, area);

    let chunks = Layout::vertical([
        Constraint::Min(6),    // spectrum
        Constraint::Length(4), // status
        Constraint::Length(1), // help bar
    ])
    .split(inner);

    draw_spectrum(f, app, chunks[0]);
    draw_status(f, app, chunks[1]);
    draw_help(f, app, chunks[2]);
}

fn draw_spectrum(f: &mut Frame, app: &App, area: Rect) {
    let color = match app.source {
        SnapshotSource::Analysis => Color::Cyan,
        SnapshotSource::Simulation => Color::Magenta,
        SnapshotSource::Reset => Color::DarkGray,
    };

    let block = Block::default()
        .title(format!(" Spectrum ({}) ", app.source))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));

    let sparkline = Sparkline::default()
        .block(block)
        .data(&app.spectrum)
        .max(100)
        .style(Style::default().fg(color));

    f.render_widget(sparkline, area);
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let label = Style::default().fg(Color::DarkGray);
    let signal = match app.signal {
        Signal::Tone(hz) => format!("tone {} Hz", hz),
        Signal::Sweep => "sweep".to_string(),
    };
    let s = &app.stats;

    let lines = vec![
        Line::from(vec![
            Span::styled("Signal: ", label),
            Span::raw(signal),
            Span::styled("  Playing: ", label),
            Span::raw(on_off(app.playing)),
            Span::styled("  Producer: ", label),
            Span::raw(on_off(app.producing)),
            Span::styled("  Seq: ", label),
            Span::raw(app.sequence.to_string()),
        ]),
        Line::from(vec![
            Span::styled("Frames: ", label),
            Span::raw(format!(
                "{} in / {} analyzed / {} dropped / {} bad",
                s.frames_submitted, s.frames_analyzed, s.frames_dropped, s.frame_errors
            )),
            Span::styled("  Sim: ", label),
            Span::raw(format!("{} of {} ticks", s.simulated_writes, s.simulation_ticks)),
        ]),
    ];

    let block = Block::default()
        .title(" Pipeline ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_help(f: &mut Frame, app: &App, area: Rect) {
    let help = Line::from(vec![
        Span::styled("  'q' ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  |  "),
        Span::styled("'space' ", Style::default().fg(Color::Yellow)),
        Span::raw(if app.playing { "pause  |  " } else { "play  |  " }),
        Span::styled("'s' ", Style::default().fg(Color::Yellow)),
        Span::raw("toggle producer"),
    ]);

    f.render_widget(Paragraph::new(help).alignment(Alignment::Left), area);
}

fn on_off(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}
