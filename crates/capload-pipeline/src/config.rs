//! Session configuration and consumer identity

use crate::error::{PipelineError, Result};
use capload_bundles::CacheConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Pipeline configuration
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Overall deadline for detect, load and resolve, in milliseconds
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Per-session cache bound
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_deadline_ms() -> u64 {
    5_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            cache: CacheConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Deadline as a duration
    #[must_use]
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Reject a zero deadline or cache capacity
    pub fn validate(&self) -> Result<()> {
        if self.deadline_ms == 0 {
            return Err(PipelineError::Config(
                "deadline_ms must be greater than zero".to_string(),
            ));
        }
        self.cache
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))
    }
}

/// Consumer the bundles are served to, written `id@version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    /// Consumer id as used in `compatible_agents`
    pub id: String,
    /// Consumer version, checked against the declared range
    pub version: String,
}

impl Consumer {
    /// Build a consumer identity
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }
}

impl FromStr for Consumer {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split_once('@') {
            Some((id, version)) if !id.is_empty() && !version.is_empty() => {
                Ok(Self::new(id, version))
            }
            _ => Err(PipelineError::Config(format!(
                "invalid consumer '{s}' (expected id@version)"
            ))),
        }
    }
}

impl fmt::Display for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.deadline(), Duration::from_secs(5));
        assert_eq!(config.cache.capacity, 3);
    }

    #[test]
    fn test_nested_cache_table() {
        let config: PipelineConfig =
            toml::from_str("deadline_ms = 250\n[cache]\ncapacity = 8\n").unwrap();
        assert_eq!(config.deadline_ms, 250);
        assert_eq!(config.cache.capacity, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let zero_deadline = PipelineConfig {
            deadline_ms: 0,
            ..PipelineConfig::default()
        };
        assert!(zero_deadline.validate().is_err());

        let zero_cache = PipelineConfig {
            cache: CacheConfig { capacity: 0 },
            ..PipelineConfig::default()
        };
        assert!(zero_cache.validate().is_err());
    }

    #[test]
    fn test_consumer_parse() {
        let consumer: Consumer = "consumerX@1.5.0".parse().unwrap();
        assert_eq!(consumer, Consumer::new("consumerX", "1.5.0"));
        assert_eq!(consumer.to_string(), "consumerX@1.5.0");

        for bad in ["consumerX", "@1.0.0", "consumerX@", ""] {
            assert!(bad.parse::<Consumer>().is_err(), "{bad:?} accepted");
        }
    }
}
