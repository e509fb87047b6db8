//! Error types for registry construction and detection

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a pattern registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two entries share the same candidate id
    #[error("Duplicate candidate id '{0}'")]
    DuplicateId(String),

    /// An entry has no signals or only zero weights
    #[error("Candidate '{0}' has no attainable score")]
    NoAttainableScore(String),

    /// A signal path is absolute or escapes the workspace
    #[error("Candidate '{candidate}' uses invalid signal path '{path}'")]
    InvalidPath {
        /// Candidate id
        candidate: String,
        /// Offending path
        path: String,
    },

    /// A `FileContains` pattern does not compile
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern source
        pattern: String,
        /// Compile error
        #[source]
        source: regex::Error,
    },
}

/// Errors raised by `Detector::detect`
#[derive(Debug, Error)]
pub enum DetectError {
    /// Workspace root is missing, unreadable or not a directory
    #[error("Invalid workspace root {path:?}: {reason}")]
    InvalidRoot {
        /// Requested root
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// Detector configuration is out of range
    #[error("Invalid detector configuration: {0}")]
    Config(String),
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, DetectError>;
