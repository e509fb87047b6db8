use crate::CandidateId;
use serde::{Deserialize, Serialize};

/// Weight class of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalClass {
    /// Weight-heavy evidence, e.g. a manifest dependency
    Primary,
    /// Weight-light evidence, e.g. a directory naming convention
    Secondary,
}

/// Where a piece of evidence came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// A file exists at a known path
    FileExistence,
    /// A field or pattern matched inside a structured file
    StructuredMatch,
    /// A directory name or file extension convention
    DirectoryPattern,
}

/// A matched evidence unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub class: SignalClass,
    pub source: SignalSource,
    /// Human readable description, e.g. `package.json depends on react`
    pub description: String,
    pub weight: u32,
}

/// How a detection outcome was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Only structured manifest evidence contributed
    Manifest,
    /// Only file/directory layout evidence contributed
    Structure,
    /// Both manifest and layout evidence contributed
    Combined,
    /// Candidate supplied by the caller instead of detected
    Manual,
    /// Nothing contributed
    None,
}

impl DetectionMethod {
    /// Derive the method from the evidence that matched
    pub fn from_evidence(evidence: &[Signal]) -> Self {
        let structured = evidence
            .iter()
            .any(|s| s.source == SignalSource::StructuredMatch);
        let layout = evidence
            .iter()
            .any(|s| s.source != SignalSource::StructuredMatch);

        match (structured, layout) {
            (true, true) => DetectionMethod::Combined,
            (true, false) => DetectionMethod::Manifest,
            (false, true) => DetectionMethod::Structure,
            (false, false) => DetectionMethod::None,
        }
    }
}

/// Score of one candidate in one detection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub candidate_id: CandidateId,
    /// Normalized score in `[0, 1]`
    pub score: f64,
    /// Matched signals, in registry order
    pub evidence: Vec<Signal>,
    pub method: DetectionMethod,
}

/// Coarse outcome of a detection run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    /// A single candidate cleared the threshold unambiguously
    Resolved,
    /// Two or more candidates compete for the top spot
    Ambiguous,
    /// No candidate cleared the threshold
    None,
}

/// Outcome of `detect()`
///
/// `primary` is `None` whenever `confidence` is below the threshold or the
/// top candidates are ambiguous. `alternates` never contains the primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub primary: Option<CandidateId>,
    /// Top candidate score in `[0, 1]`
    pub confidence: f64,
    /// Candidates scoring above zero, score descending
    pub alternates: Vec<CandidateMatch>,
    pub method: DetectionMethod,
    pub status: DetectionStatus,
}

impl DetectionResult {
    /// Result for a workspace that produced no evidence at all
    pub fn empty() -> Self {
        Self {
            primary: None,
            confidence: 0.0,
            alternates: Vec::new(),
            method: DetectionMethod::None,
            status: DetectionStatus::None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == DetectionStatus::Resolved
    }
}
