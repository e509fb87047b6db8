//! Confidence-scored profile detection
//!
//! Each candidate's score is its matched signal weight divided by its maximum
//! attainable weight. The top candidate becomes primary only when it clears
//! the threshold and nothing competes with it; ties are never broken silently.

use crate::config::DetectorConfig;
use crate::error::{DetectError, Result};
use crate::registry::{PatternRegistry, ProfilePattern, SignalKind, SignalSpec};
use crate::snapshot::WorkspaceSnapshot;
use capload_types::{
    CandidateMatch, DetectionMethod, DetectionResult, DetectionStatus, Signal,
};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Detector bound to an immutable registry
#[derive(Debug, Clone)]
pub struct Detector {
    registry: Arc<PatternRegistry>,
    config: DetectorConfig,
}

impl Detector {
    /// Create a detector, validating its configuration
    pub fn new(registry: Arc<PatternRegistry>, config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { registry, config })
    }

    /// The registry this detector scores against
    #[must_use]
    pub fn registry(&self) -> &Arc<PatternRegistry> {
        &self.registry
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Score every registered candidate against the workspace
    ///
    /// Pure with respect to the filesystem: reads only, and identical
    /// workspace state always yields an identical result.
    pub fn detect(&self, root: &Path) -> Result<DetectionResult> {
        let meta = std::fs::metadata(root).map_err(|e| DetectError::InvalidRoot {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !meta.is_dir() {
            return Err(DetectError::InvalidRoot {
                path: root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }

        let snapshot = WorkspaceSnapshot::capture(root, self.config.max_scan_depth);
        let mut scored: Vec<CandidateMatch> = self
            .registry
            .entries()
            .iter()
            .map(|entry| score_candidate(entry, &snapshot))
            .filter(|m| m.score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });

        for m in &scored {
            debug!(
                "Candidate {} scored {:.3} from {} signal(s)",
                m.candidate_id,
                m.score,
                m.evidence.len()
            );
        }

        let result = self.resolve(scored);
        info!(
            "Detection in {:?}: status={:?} primary={:?} confidence={:.3}",
            root,
            result.status,
            result.primary.as_ref().map(ToString::to_string),
            result.confidence
        );
        Ok(result)
    }

    /// Turn sorted candidate scores into a result
    fn resolve(&self, mut scored: Vec<CandidateMatch>) -> DetectionResult {
        let Some(top) = scored.first() else {
            return DetectionResult::empty();
        };

        let confidence = top.score.clamp(0.0, 1.0);
        let method = top.method;

        let tied = scored
            .get(1)
            .is_some_and(|runner| (top.score - runner.score).abs() < self.config.tie_epsilon);
        let conflicting = scored.iter().skip(1).any(|other| {
            other.score >= self.config.threshold
                && !self
                    .registry
                    .are_related(&top.candidate_id, &other.candidate_id)
        });

        if confidence < self.config.threshold {
            return DetectionResult {
                primary: None,
                confidence,
                alternates: scored,
                method,
                status: DetectionStatus::None,
            };
        }

        if tied || conflicting {
            return DetectionResult {
                primary: None,
                confidence,
                alternates: scored,
                method,
                status: DetectionStatus::Ambiguous,
            };
        }

        let top = scored.remove(0);
        DetectionResult {
            primary: Some(top.candidate_id),
            confidence,
            alternates: scored,
            method,
            status: DetectionStatus::Resolved,
        }
    }
}

fn score_candidate(entry: &ProfilePattern, snapshot: &WorkspaceSnapshot) -> CandidateMatch {
    let evidence: Vec<Signal> = entry
        .signals
        .iter()
        .filter_map(|spec| evaluate(spec, snapshot))
        .collect();

    let matched: u64 = evidence.iter().map(|s| u64::from(s.weight)).sum();
    let max = entry.max_score();

    #[allow(clippy::cast_precision_loss)]
    let score = if max == 0 {
        0.0
    } else {
        (matched as f64 / max as f64).clamp(0.0, 1.0)
    };

    CandidateMatch {
        candidate_id: entry.id.clone(),
        score,
        method: DetectionMethod::from_evidence(&evidence),
        evidence,
    }
}

/// Evaluate one signal, returning evidence when it matches
fn evaluate(spec: &SignalSpec, snapshot: &WorkspaceSnapshot) -> Option<Signal> {
    let description = match &spec.kind {
        SignalKind::FileExists { paths } => {
            let found = paths.iter().find(|p| snapshot.is_file(p))?;
            format!("file {found} exists")
        }
        SignalKind::DirectoryExists { paths } => {
            let found = paths.iter().find(|p| snapshot.is_dir(p))?;
            format!("directory {found} exists")
        }
        SignalKind::ManifestDependency { manifest, name } => {
            let file = snapshot.dependency_source(*manifest, name)?;
            format!("{file} depends on {name}")
        }
        SignalKind::FileContains { path, pattern } => {
            let content = snapshot.content(path)?;
            if !pattern.is_match(&content) {
                return None;
            }
            format!("{path} matches /{}/", pattern.as_str())
        }
        SignalKind::ExtensionPresent { extension } => {
            if !snapshot.has_extension(extension) {
                return None;
            }
            format!("*.{extension} files present")
        }
    };

    Some(Signal {
        class: spec.class,
        source: spec.kind.source(),
        description,
        weight: spec.weight,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::{Manifest, ProfilePattern, SignalKind};
    use capload_types::CandidateId;
    use std::fs;
    use tempfile::TempDir;

    fn builtin_detector() -> Detector {
        Detector::new(
            Arc::new(PatternRegistry::builtin().unwrap()),
            DetectorConfig::default(),
        )
        .unwrap()
    }

    fn write(dir: &TempDir, path: &str, content: &str) {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }

    #[test]
    fn test_react_manifest_resolves() {
        let dir = TempDir::new().unwrap();
        write(&dir, "package.json", r#"{"dependencies": {"react": "^18.2.0"}}"#);

        let result = builtin_detector().detect(dir.path()).unwrap();
        assert_eq!(result.primary, Some(CandidateId::new("react-framework")));
        assert!(result.confidence >= 0.8);
        assert_eq!(result.status, DetectionStatus::Resolved);
        assert_eq!(result.method, DetectionMethod::Manifest);
        assert!(result.alternates.is_empty());
    }

    #[test]
    fn test_empty_workspace() {
        let dir = TempDir::new().unwrap();
        let result = builtin_detector().detect(dir.path()).unwrap();
        assert!(result.primary.is_none());
        assert_eq!(result.confidence, 0.0);
        assert!(result.alternates.is_empty());
        assert_eq!(result.status, DetectionStatus::None);
    }

    #[test]
    fn test_low_confidence_reports_all_alternates() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::create_dir_all(dir.path().join("static")).unwrap();

        let result = builtin_detector().detect(dir.path()).unwrap();
        assert!(result.primary.is_none());
        assert_eq!(result.status, DetectionStatus::None);
        assert!(result.confidence < 0.8);
        let ids: Vec<_> = result
            .alternates
            .iter()
            .map(|m| m.candidate_id.as_str())
            .collect();
        assert!(ids.contains(&"django-framework"));
        assert!(ids.contains(&"flask-framework"));
    }

    #[test]
    fn test_exact_tie_is_ambiguous() {
        let registry = PatternRegistry::new(vec![
            ProfilePattern::new("alpha", "Alpha")
                .primary(85, SignalKind::file(&["alpha.lock"]))
                .secondary(15, SignalKind::dir(&["alpha"])),
            ProfilePattern::new("beta", "Beta")
                .primary(85, SignalKind::file(&["beta.lock"]))
                .secondary(15, SignalKind::dir(&["beta"])),
        ])
        .unwrap();
        let detector = Detector::new(Arc::new(registry), DetectorConfig::default()).unwrap();

        let dir = TempDir::new().unwrap();
        write(&dir, "alpha.lock", "");
        write(&dir, "beta.lock", "");

        let result = detector.detect(dir.path()).unwrap();
        assert!(result.primary.is_none());
        assert_eq!(result.status, DetectionStatus::Ambiguous);
        assert!((result.confidence - 0.85).abs() < 1e-9);
        assert_eq!(result.alternates.len(), 2);
        assert_eq!(result.alternates[0].candidate_id.as_str(), "alpha");
        assert_eq!(result.alternates[1].candidate_id.as_str(), "beta");
        for m in &result.alternates {
            assert!((m.score - 0.85).abs() < 1e-9);
        }
    }

    #[test]
    fn test_near_tie_within_epsilon_is_ambiguous() {
        let registry = PatternRegistry::new(vec![
            ProfilePattern::new("alpha", "Alpha")
                .primary(90, SignalKind::file(&["a"]))
                .secondary(10, SignalKind::file(&["x"])),
            ProfilePattern::new("beta", "Beta")
                .primary(89, SignalKind::file(&["b"]))
                .secondary(11, SignalKind::file(&["y"])),
        ])
        .unwrap();
        let detector = Detector::new(
            Arc::new(registry),
            DetectorConfig::default().with_threshold(0.95),
        )
        .unwrap();

        let dir = TempDir::new().unwrap();
        write(&dir, "a", "");
        write(&dir, "b", "");

        // 0.90 vs 0.89, both below threshold 0.95
        let result = detector.detect(dir.path()).unwrap();
        assert_eq!(result.status, DetectionStatus::None);

        let detector = Detector::new(
            Arc::clone(detector.registry()),
            DetectorConfig::default().with_threshold(0.5),
        )
        .unwrap();
        let result = detector.detect(dir.path()).unwrap();
        assert_eq!(result.status, DetectionStatus::Ambiguous);
        assert!(result.primary.is_none());
    }

    #[test]
    fn test_two_unrelated_strong_candidates_are_ambiguous() {
        let dir = TempDir::new().unwrap();
        write(&dir, "package.json", r#"{"dependencies": {"react": "18"}}"#);
        write(&dir, "src/components/App.jsx", "");
        write(&dir, "requirements.txt", "django\n");
        write(&dir, "manage.py", "");

        let result = builtin_detector().detect(dir.path()).unwrap();
        assert!(result.primary.is_none());
        assert_eq!(result.status, DetectionStatus::Ambiguous);
        assert!((result.confidence - 1.0).abs() < 1e-9);
        let ids: Vec<_> = result
            .alternates
            .iter()
            .map(|m| m.candidate_id.as_str())
            .collect();
        assert_eq!(ids, vec!["react-framework", "django-framework"]);
    }

    #[test]
    fn test_related_candidates_do_not_conflict() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "package.json",
            r#"{"dependencies": {"next": "14", "react": "18"}}"#,
        );
        write(&dir, "next.config.js", "module.exports = {}");
        fs::create_dir_all(dir.path().join("app")).unwrap();
        fs::create_dir_all(dir.path().join("public")).unwrap();

        let result = builtin_detector().detect(dir.path()).unwrap();
        assert_eq!(result.primary, Some(CandidateId::new("nextjs-framework")));
        assert_eq!(result.status, DetectionStatus::Resolved);
        assert_eq!(result.method, DetectionMethod::Combined);
        assert_eq!(result.alternates.len(), 1);
        assert_eq!(
            result.alternates[0].candidate_id.as_str(),
            "react-framework"
        );
    }

    #[test]
    fn test_file_contains_signal() {
        let dir = TempDir::new().unwrap();
        write(&dir, "requirements.txt", "flask==3.0\n");
        write(&dir, "app.py", "from flask import Flask\napp = Flask(__name__)\n");

        let result = builtin_detector().detect(dir.path()).unwrap();
        assert_eq!(result.primary, Some(CandidateId::new("flask-framework")));
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let dir = TempDir::new().unwrap();
        write(&dir, "package.json", r#"{"dependencies": {"vue": "3", "express": "4"}}"#);
        write(&dir, "src/App.vue", "<template></template>");
        fs::create_dir_all(dir.path().join("routes")).unwrap();

        let detector = builtin_detector();
        let first = detector.detect(dir.path()).unwrap();
        for _ in 0..5 {
            assert_eq!(detector.detect(dir.path()).unwrap(), first);
        }
    }

    #[test]
    fn test_confidence_always_in_range() {
        let dir = TempDir::new().unwrap();
        write(&dir, "Cargo.toml", "[dependencies]\naxum = \"0.7\"\n");
        write(&dir, "src/main.rs", "use axum::Router;\n");
        fs::create_dir_all(dir.path().join("src/routes")).unwrap();

        let result = builtin_detector().detect(dir.path()).unwrap();
        assert!((0.0..=1.0).contains(&result.confidence));
        assert_eq!(result.primary, Some(CandidateId::new("rust-axum-service")));
        for m in &result.alternates {
            assert!((0.0..=1.0).contains(&m.score));
        }
    }

    #[test]
    fn test_invalid_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            builtin_detector().detect(&missing),
            Err(DetectError::InvalidRoot { .. })
        ));

        write(&dir, "file.txt", "");
        assert!(matches!(
            builtin_detector().detect(&dir.path().join("file.txt")),
            Err(DetectError::InvalidRoot { .. })
        ));
    }

    #[test]
    fn test_manifest_dependency_case_insensitive() {
        let registry = PatternRegistry::new(vec![ProfilePattern::new("comp", "Composer")
            .primary(100, SignalKind::dependency(Manifest::Composer, "Laravel/Framework"))])
        .unwrap();
        let detector = Detector::new(Arc::new(registry), DetectorConfig::default()).unwrap();

        let dir = TempDir::new().unwrap();
        write(&dir, "composer.json", r#"{"require": {"laravel/framework": "^11"}}"#);
        let result = detector.detect(dir.path()).unwrap();
        assert_eq!(result.primary, Some(CandidateId::new("comp")));
    }
}
