use crate::{
    CandidateId, DetectionStatus, ErrorResult, FallbackDecision, FallbackTrigger, Tier,
};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Kind of active construct stripped by the sanitizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalKind {
    /// `<script>` block
    ScriptBlock,
    /// `<iframe>`, `<object>` or `<embed>` element
    EmbeddedElement,
    /// `on*=` attribute inside a tag
    EventHandler,
    /// `javascript:`/`vbscript:` URL
    ScriptUrl,
    /// `data:` URI with an executable media type
    ExecutableDataUri,
}

/// Events emitted to the audit collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A detection run finished
    DetectionAttempted {
        workspace: String,
        status: DetectionStatus,
        primary: Option<CandidateId>,
        confidence: f64,
        alternates: usize,
    },

    /// A detection run could not inspect the workspace
    DetectionFailed { workspace: String, reason: String },

    /// The sanitizer removed an active construct
    SanitizationRemoval {
        bundle_id: CandidateId,
        tier: Tier,
        kind: RemovalKind,
        offset: usize,
        excerpt: String,
    },

    /// The fallback controller suspended a request
    FallbackEngaged {
        request_id: Uuid,
        trigger: FallbackTrigger,
        error: ErrorResult,
    },

    /// The caller resolved a suspended request
    FallbackDecided(FallbackDecision),

    /// Content was served to the caller
    BundleServed {
        bundle_id: CandidateId,
        tier: Tier,
        cached: bool,
        bytes: usize,
    },

    /// A request failed fast on an input error
    RequestRejected { error: ErrorResult },
}

/// Write-only sink for audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Audit sink that keeps events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());

        sink.record(AuditEvent::BundleServed {
            bundle_id: "react-framework".into(),
            tier: Tier::Summary,
            cached: false,
            bytes: 12,
        });
        sink.record(AuditEvent::BundleServed {
            bundle_id: "react-framework".into(),
            tier: Tier::Summary,
            cached: true,
            bytes: 12,
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            AuditEvent::BundleServed { cached: true, .. }
        ));
    }

    #[test]
    fn test_event_tagging() {
        let event = AuditEvent::SanitizationRemoval {
            bundle_id: "vue-framework".into(),
            tier: Tier::Detail,
            kind: RemovalKind::ScriptBlock,
            offset: 4,
            excerpt: "<script>".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "sanitization_removal");
        assert_eq!(json["kind"], "script_block");
    }
}
