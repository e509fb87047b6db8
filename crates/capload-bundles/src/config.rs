//! Configuration types for loading and caching

use crate::error::{LoadError, Result};
use capload_types::Tier;
use serde::Deserialize;

/// Per-tier byte ceilings
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct LoaderLimits {
    /// Ceiling for the summary tier
    #[serde(default = "default_summary_max_bytes")]
    pub summary_max_bytes: u64,

    /// Ceiling for the detail tier
    #[serde(default = "default_detail_max_bytes")]
    pub detail_max_bytes: u64,
}

fn default_summary_max_bytes() -> u64 {
    100 * 1024
}

fn default_detail_max_bytes() -> u64 {
    1024 * 1024
}

impl Default for LoaderLimits {
    fn default() -> Self {
        Self {
            summary_max_bytes: default_summary_max_bytes(),
            detail_max_bytes: default_detail_max_bytes(),
        }
    }
}

impl LoaderLimits {
    /// Ceiling for `tier`
    #[must_use]
    pub fn for_tier(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Summary => self.summary_max_bytes,
            Tier::Detail => self.detail_max_bytes,
        }
    }

    /// Reject zero ceilings
    pub fn validate(&self) -> Result<()> {
        if self.summary_max_bytes == 0 || self.detail_max_bytes == 0 {
            return Err(LoadError::Config(
                "tier byte limits must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Session cache configuration
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Most-recently-used entries kept per session
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    3
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl CacheConfig {
    /// Reject a zero capacity
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(LoadError::Config(
                "cache capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
