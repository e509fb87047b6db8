use anyhow::Result;
use capload_types::{AuditEvent, AuditSink};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the logging system
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true),
        )
        .try_init()?;

    Ok(())
}

/// Audit sink that emits every event as a structured `tracing` record
/// on the `capload::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

/// Short event name used as a log field
fn event_name(event: &AuditEvent) -> &'static str {
    match event {
        AuditEvent::DetectionAttempted { .. } => "detection_attempted",
        AuditEvent::DetectionFailed { .. } => "detection_failed",
        AuditEvent::SanitizationRemoval { .. } => "sanitization_removal",
        AuditEvent::FallbackEngaged { .. } => "fallback_engaged",
        AuditEvent::FallbackDecided(_) => "fallback_decided",
        AuditEvent::BundleServed { .. } => "bundle_served",
        AuditEvent::RequestRejected { .. } => "request_rejected",
    }
}

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let name = event_name(&event);
        match serde_json::to_string(&event) {
            Ok(payload) => info!(target: "capload::audit", event = name, %payload),
            Err(e) => warn!(target: "capload::audit", event = name, "Failed to serialize audit event: {}", e),
        }
    }
}
