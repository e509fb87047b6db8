//! Fallback controller
//!
//! The single decision point for every request that cannot be served as
//! detected. Engaging it suspends the request: the caller receives a
//! [`PendingFallback`] listing the three resolutions and later resumes the
//! session with its choice. The controller itself keeps no state.

use capload_types::{
    AuditEvent, AuditSink, DetectionResult, ErrorResult, FallbackChoice, FallbackDecision,
    FallbackOption, FallbackTrigger, Tier,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// A request suspended until the caller picks a resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingFallback {
    /// Request this decision belongs to
    pub request_id: Uuid,
    /// Why the controller was engaged
    pub trigger: FallbackTrigger,
    /// Structured error with the offered options
    pub error: ErrorResult,
    /// Tier that was requested
    pub tier: Tier,
    /// Detection outcome, when detection caused the suspension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionResult>,
}

impl PendingFallback {
    /// Resolutions the caller may choose from
    #[must_use]
    pub fn options(&self) -> &[FallbackOption] {
        self.error.options.as_deref().unwrap_or(&[])
    }
}

/// Stateless fallback controller
#[derive(Clone)]
pub struct FallbackController {
    audit: Arc<dyn AuditSink>,
}

impl FallbackController {
    /// Controller reporting to `audit`
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }

    /// Suspend a request
    pub fn engage(
        &self,
        request_id: Uuid,
        trigger: FallbackTrigger,
        message: impl Into<String>,
        tier: Tier,
        detection: Option<DetectionResult>,
    ) -> PendingFallback {
        let error = ErrorResult::new(trigger.error_code(), message);
        warn!(
            "Fallback engaged for request {} ({}): {}",
            request_id, error.code, error.message
        );

        self.audit.record(AuditEvent::FallbackEngaged {
            request_id,
            trigger: trigger.clone(),
            error: error.clone(),
        });

        PendingFallback {
            request_id,
            trigger,
            error,
            tier,
            detection,
        }
    }

    /// Record the caller's resolution of a suspended request
    pub fn resolve(&self, pending: &PendingFallback, choice: FallbackChoice) -> FallbackDecision {
        let decision = FallbackDecision {
            request_id: pending.request_id,
            trigger: pending.trigger.clone(),
            choice,
            timestamp: Utc::now(),
        };
        info!(
            "Fallback for request {} resolved with '{}'",
            decision.request_id,
            decision.choice.option()
        );

        self.audit.record(AuditEvent::FallbackDecided(decision.clone()));
        decision
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use capload_types::{CandidateId, ErrorCode, MemoryAuditSink};

    #[test]
    fn test_engage_offers_three_options() {
        let audit = Arc::new(MemoryAuditSink::new());
        let controller = FallbackController::new(audit.clone());

        let pending = controller.engage(
            Uuid::new_v4(),
            FallbackTrigger::NoCandidate,
            "no candidate matched",
            Tier::Summary,
            Some(DetectionResult::empty()),
        );

        assert_eq!(pending.error.code, ErrorCode::CandidateNotFound);
        assert_eq!(pending.options(), FallbackOption::ALL.as_slice());
        assert!(matches!(
            audit.events().as_slice(),
            [AuditEvent::FallbackEngaged {
                trigger: FallbackTrigger::NoCandidate,
                ..
            }]
        ));
    }

    #[test]
    fn test_resolve_is_audited() {
        let audit = Arc::new(MemoryAuditSink::new());
        let controller = FallbackController::new(audit.clone());
        let pending = controller.engage(
            Uuid::new_v4(),
            FallbackTrigger::Incompatible,
            "consumer too old",
            Tier::Detail,
            None,
        );

        let choice = FallbackChoice::Manual {
            candidate_id: CandidateId::new("vue-framework"),
            tier: Tier::Summary,
        };
        let decision = controller.resolve(&pending, choice.clone());

        assert_eq!(decision.request_id, pending.request_id);
        assert_eq!(decision.trigger, FallbackTrigger::Incompatible);
        assert_eq!(decision.choice, choice);
        assert_eq!(audit.len(), 2);
        assert!(matches!(
            audit.events().last(),
            Some(AuditEvent::FallbackDecided(d)) if d.choice.option() == FallbackOption::Manual
        ));
    }
}
