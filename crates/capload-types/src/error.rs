use crate::FallbackOption;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable failure codes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CandidateNotFound,
    SizeLimitExceeded,
    SanitizationFailed,
    VersionIncompatible,
    AmbiguousDetection,
    PathTraversalRejected,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::CandidateNotFound => "CANDIDATE_NOT_FOUND",
            ErrorCode::SizeLimitExceeded => "SIZE_LIMIT_EXCEEDED",
            ErrorCode::SanitizationFailed => "SANITIZATION_FAILED",
            ErrorCode::VersionIncompatible => "VERSION_INCOMPATIBLE",
            ErrorCode::AmbiguousDetection => "AMBIGUOUS_DETECTION",
            ErrorCode::PathTraversalRejected => "PATH_TRAVERSAL_REJECTED",
        }
    }

    /// Recoverable codes offer the caller the three fallback options.
    /// A traversal attempt is an input error and fails fast.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorCode::PathTraversalRejected)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure returned to the calling policy layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FallbackOption>>,
}

impl ErrorResult {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let options = code
            .is_recoverable()
            .then(|| FallbackOption::ALL.to_vec());
        Self {
            code,
            message: message.into(),
            options,
        }
    }
}

impl fmt::Display for ErrorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_codes_carry_all_options() {
        let err = ErrorResult::new(ErrorCode::SizeLimitExceeded, "too big");
        assert_eq!(
            err.options,
            Some(vec![
                FallbackOption::Generic,
                FallbackOption::Abort,
                FallbackOption::Manual
            ])
        );
    }

    #[test]
    fn test_traversal_has_no_options() {
        let err = ErrorResult::new(ErrorCode::PathTraversalRejected, "../etc");
        assert!(err.options.is_none());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "PATH_TRAVERSAL_REJECTED");
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_code_serialization_matches_as_str() {
        for code in [
            ErrorCode::CandidateNotFound,
            ErrorCode::SizeLimitExceeded,
            ErrorCode::SanitizationFailed,
            ErrorCode::VersionIncompatible,
            ErrorCode::AmbiguousDetection,
            ErrorCode::PathTraversalRejected,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }
}
