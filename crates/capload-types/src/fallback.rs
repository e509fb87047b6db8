use crate::{CandidateId, ErrorCode, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The three resolutions offered whenever the fallback engages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackOption {
    /// Proceed without a capability bundle
    Generic,
    /// Abort the current task
    Abort,
    /// Retry the pipeline from the loader with a caller supplied candidate
    Manual,
}

impl FallbackOption {
    pub const ALL: [FallbackOption; 3] = [
        FallbackOption::Generic,
        FallbackOption::Abort,
        FallbackOption::Manual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FallbackOption::Generic => "generic",
            FallbackOption::Abort => "abort",
            FallbackOption::Manual => "manual",
        }
    }
}

impl fmt::Display for FallbackOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the fallback controller was engaged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FallbackTrigger {
    /// Top candidate scored below the threshold
    LowConfidence,
    /// Workspace produced no evidence for any candidate
    NoCandidate,
    /// Two or more candidates competed for the top spot
    Ambiguous { candidates: Vec<CandidateId> },
    /// Loader hard-failed
    LoadFailed { code: ErrorCode },
    /// Bundle does not support the consumer version
    Incompatible,
    /// Overall pipeline deadline expired
    DeadlineExpired,
}

impl FallbackTrigger {
    /// Error code surfaced alongside this trigger
    pub fn error_code(&self) -> ErrorCode {
        match self {
            FallbackTrigger::LowConfidence
            | FallbackTrigger::NoCandidate
            | FallbackTrigger::DeadlineExpired => ErrorCode::CandidateNotFound,
            FallbackTrigger::Ambiguous { .. } => ErrorCode::AmbiguousDetection,
            FallbackTrigger::LoadFailed { code } => *code,
            FallbackTrigger::Incompatible => ErrorCode::VersionIncompatible,
        }
    }
}

/// Resolution chosen by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "option", rename_all = "lowercase")]
pub enum FallbackChoice {
    Generic,
    Abort,
    Manual { candidate_id: CandidateId, tier: Tier },
}

impl FallbackChoice {
    pub fn option(&self) -> FallbackOption {
        match self {
            FallbackChoice::Generic => FallbackOption::Generic,
            FallbackChoice::Abort => FallbackOption::Abort,
            FallbackChoice::Manual { .. } => FallbackOption::Manual,
        }
    }
}

/// A completed fallback resolution, handed off to the audit sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackDecision {
    pub request_id: Uuid,
    pub trigger: FallbackTrigger,
    pub choice: FallbackChoice,
    pub timestamp: DateTime<Utc>,
}
