//! `Capload` Pipeline
//!
//! Ties detection, loading, compatibility checks and the session cache into
//! one request flow with an explicit fallback contract.
//!
//! ## Request flow
//!
//! 1. Detect the workspace profile
//! 2. Serve the bundle from the session cache, or load it
//! 3. Check the bundle supports the consumer
//! 4. Return the content, or suspend on a [`PendingFallback`]
//!
//! A suspended request is resumed with one of three choices: proceed
//! generically, abort, or retry from the loader with a manual candidate.

#![deny(unsafe_code, dead_code, unused_imports, unused_variables, missing_docs)]

pub mod config;
pub mod error;
pub mod fallback;
pub mod session;

pub use config::{Consumer, PipelineConfig};
pub use error::{PipelineError, Result};
pub use fallback::{FallbackController, PendingFallback};
pub use session::{LoadResult, PipelineOutcome, PipelineReport, PipelineState, Session};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Consumer, PendingFallback, PipelineConfig, PipelineOutcome, PipelineReport, Session,
    };
}
