//! Error types for Bandscope
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for the spectrum engine
#[derive(Error, Debug)]
pub enum VizError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Frame has no samples")]
    EmptyFrame,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Expected {expected} bins, got {actual}")]
    BinCount { expected: usize, actual: usize },

    #[error("Thread error: {0}")]
    Thread(String),

    #[error("Timed out stopping: {}", .0.join(", "))]
    ShutdownTimeout(Vec<String>),
}

/// Result type alias for Bandscope
pub type Result<T> = std::result::Result<T, VizError>;
