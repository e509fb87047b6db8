//! `Capload` Detection
//!
//! Determines which capability profile applies to a workspace.
//!
//! ## Architecture
//!
//! - `PatternRegistry`: immutable table of profiles and their weighted signals
//! - `WorkspaceSnapshot`: per-run, read-only view of the workspace
//! - `Detector`: scores every profile and resolves a `DetectionResult`
//!
//! A profile's score is the sum of its matched signal weights normalized by
//! its maximum attainable weight. Ambiguous or low-confidence outcomes leave
//! `primary` empty and report every scoring candidate as an alternate.

#![deny(unsafe_code, dead_code, unused_imports, unused_variables, missing_docs)]

pub mod config;
pub mod detector;
pub mod error;
pub mod registry;
pub mod snapshot;

pub use config::DetectorConfig;
pub use detector::Detector;
pub use error::{DetectError, RegistryError};
pub use registry::{Manifest, PatternRegistry, ProfilePattern, SignalKind, SignalSpec};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{DetectError, Detector, DetectorConfig, PatternRegistry};
}
