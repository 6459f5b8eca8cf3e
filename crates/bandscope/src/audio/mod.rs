//! Audio subsystem
//!
//! Frame intake, spectral analysis, simulation fallback, and the shared
//! spectrum snapshot.
//!

pub mod binner;
pub mod buffer;
pub mod pipeline;
pub mod simulation;
pub mod state;
pub mod stats;
pub mod tap;
pub mod transform;
pub mod types;

pub use binner::LogBinner;
pub use buffer::{FrameBuffer, FrameSink};
pub use pipeline::{AudioSource, ShutdownReport, SpectrumPipeline};
pub use simulation::SimulationGenerator;
pub use state::{SpectrumPublisher, SpectrumState, SubscriptionId};
pub use stats::{PipelineStats, StatsSnapshot};
pub use tap::TapSource;
pub use transform::SpectralTransform;
pub use types::{AudioFrame, PlaybackFlag, PlaybackStatus, SnapshotSource, SpectrumSnapshot};
