//! Error types for the pipeline

use capload_detect::DetectError;
use thiserror::Error;

/// Pipeline errors
///
/// Only input and setup failures are errors. Ambiguity, load failures and
/// incompatibility are outcomes routed through the fallback controller.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Workspace could not be inspected
    #[error(transparent)]
    Detect(#[from] DetectError),

    /// Session or consumer configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A blocking pipeline task panicked or was cancelled
    #[error("Pipeline task failed: {0}")]
    Task(String),
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, PipelineError>;
