//! Configuration types for the detector

use crate::error::{DetectError, Result};
use serde::Deserialize;

/// Detector configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Minimum score for a candidate to become primary
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Scores closer than this are treated as a tie
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f64,

    /// How deep the extension scan descends below the workspace root
    #[serde(default = "default_max_scan_depth")]
    pub max_scan_depth: usize,
}

fn default_threshold() -> f64 {
    0.8
}

fn default_tie_epsilon() -> f64 {
    0.02
}

fn default_max_scan_depth() -> usize {
    3
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            tie_epsilon: default_tie_epsilon(),
            max_scan_depth: default_max_scan_depth(),
        }
    }
}

impl DetectorConfig {
    /// Override the confidence threshold
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Reject values that would make scoring meaningless
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(DetectError::Config(format!(
                "threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if !(0.0..1.0).contains(&self.tie_epsilon) {
            return Err(DetectError::Config(format!(
                "tie_epsilon must be in [0, 1), got {}",
                self.tie_epsilon
            )));
        }
        Ok(())
    }
}
