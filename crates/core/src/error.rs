use crate::PipelineState;

/// Result alias that carries the custom [`DominanceError`] type.
pub type Result<T> = std::result::Result<T, DominanceError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum DominanceError {
    /// The frame source could not be opened. Surfaced synchronously from
    /// [`DominancePipeline::start`](crate::DominancePipeline::start).
    #[error("frame source acquisition failed: {0}")]
    Acquisition(String),
    /// The frame source failed after the loop was already running.
    #[error("frame source failed: {0}")]
    Source(String),
    #[error("invalid analysis configuration: {0}")]
    InvalidConfig(String),
    #[error("cannot {operation} while pipeline is {state}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },
    /// The analysis worker exited before reporting whether its source opened.
    #[error("analysis worker terminated unexpectedly")]
    WorkerLost,
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("configuration parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DominanceError {
    /// Creates an acquisition error from anything printable.
    pub fn acquisition<T: std::fmt::Display>(cause: T) -> Self {
        Self::Acquisition(cause.to_string())
    }

    /// Creates a mid-run source error from anything printable.
    pub fn source_failed<T: std::fmt::Display>(cause: T) -> Self {
        Self::Source(cause.to_string())
    }
}
