//! Capload Types - Core types shared by the capability loading crates
//!
//! This module defines the data model exchanged between detection, loading,
//! compatibility checks, the fallback controller and the audit sink.

pub mod audit;
pub mod detection;
pub mod error;
pub mod fallback;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, RemovalKind};
pub use detection::{
    CandidateMatch, DetectionMethod, DetectionResult, DetectionStatus, Signal, SignalClass,
    SignalSource,
};
pub use error::{ErrorCode, ErrorResult};
pub use fallback::{FallbackChoice, FallbackDecision, FallbackOption, FallbackTrigger};

/// Identifier of a capability profile (and of the bundle serving it)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CandidateId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CandidateId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Granularity of served bundle content (progressive disclosure)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Short overview served on first activation
    Summary,
    /// Expanded content served on explicit request
    Detail,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Summary => "summary",
            Tier::Detail => "detail",
        }
    }

    /// File name of this tier inside a bundle directory
    pub fn file_name(self) -> &'static str {
        match self {
            Tier::Summary => "summary.md",
            Tier::Detail => "detail.md",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown tier name
#[derive(Debug, Clone, Error)]
#[error("unknown tier '{0}' (expected 'summary' or 'detail')")]
pub struct ParseTierError(pub String);

impl FromStr for Tier {
    type Err = ParseTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(Tier::Summary),
            "detail" => Ok(Tier::Detail),
            other => Err(ParseTierError(other.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse() {
        assert_eq!("summary".parse::<Tier>().unwrap(), Tier::Summary);
        assert_eq!("detail".parse::<Tier>().unwrap(), Tier::Detail);
        assert!("Detail".parse::<Tier>().is_err());
    }

    #[test]
    fn test_tier_serde() {
        assert_eq!(serde_json::to_string(&Tier::Detail).unwrap(), "\"detail\"");
        let id: CandidateId = serde_json::from_str("\"react-framework\"").unwrap();
        assert_eq!(id.as_str(), "react-framework");
    }
}
