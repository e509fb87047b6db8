//! Error types for bundle loading

use capload_types::{ErrorCode, Tier};
use std::io;
use thiserror::Error;

/// Bundle loading errors
///
/// Every variant is a hard failure: no partial content accompanies it.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Bundle id contains a sequence that could escape the store root
    #[error("Bundle id '{0}' attempts to escape the bundle store")]
    PathTraversal(String),

    /// Bundle id is empty, too long or uses forbidden characters
    #[error("Malformed bundle id '{0}'")]
    InvalidId(String),

    /// No file for the requested bundle and tier
    #[error("Bundle '{id}' has no {tier} tier")]
    NotFound {
        /// Bundle id
        id: String,
        /// Requested tier
        tier: Tier,
    },

    /// Raw content is larger than the tier's ceiling
    #[error("Bundle '{id}' {tier} tier exceeds the {limit} byte limit")]
    SizeLimit {
        /// Bundle id
        id: String,
        /// Requested tier
        tier: Tier,
        /// Ceiling in bytes
        limit: u64,
    },

    /// Content could not be sanitized safely
    #[error("Sanitization failed for bundle '{id}': {reason}")]
    Sanitization {
        /// Bundle id
        id: String,
        /// Failure reason
        reason: String,
    },

    /// Metadata header missing or invalid
    #[error("Invalid metadata for bundle '{id}': {reason}")]
    Metadata {
        /// Bundle id
        id: String,
        /// Validation failure
        reason: String,
    },

    /// Read failed (after the single transient retry)
    #[error("Failed to read bundle '{id}': {source}")]
    Io {
        /// Bundle id
        id: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Loader configuration is out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Built-in pattern failed to compile
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl LoadError {
    /// Caller-facing error code
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            LoadError::PathTraversal(_) => ErrorCode::PathTraversalRejected,
            LoadError::SizeLimit { .. } => ErrorCode::SizeLimitExceeded,
            LoadError::Sanitization { .. } => ErrorCode::SanitizationFailed,
            LoadError::InvalidId(_)
            | LoadError::NotFound { .. }
            | LoadError::Metadata { .. }
            | LoadError::Io { .. }
            | LoadError::Config(_)
            | LoadError::Pattern(_) => ErrorCode::CandidateNotFound,
        }
    }
}

/// Whether an I/O failure may succeed when retried
#[must_use]
pub fn is_transient(err: &io::Error) -> bool {
    !matches!(
        err.kind(),
        io::ErrorKind::NotFound
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
    )
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, LoadError>;
