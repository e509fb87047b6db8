use crate::config::{Config, FallbackPolicy};
use anyhow::Result;
use capload_bundles::{BundleStore, Loader};
use capload_detect::{Detector, PatternRegistry};
use capload_logging::TracingAuditSink;
use capload_pipeline::{PipelineOutcome, PipelineReport, Session};
use capload_types::{AuditSink, FallbackChoice};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

/// Gateway service - runs one capability request end to end
pub struct GatewayService {
    config: Config,
}

impl GatewayService {
    /// Create a new gateway service
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the gateway service
    pub async fn run(self) -> Result<()> {
        capload_logging::init_logging(&self.config.logging.level)?;
        info!("Starting capload gateway");

        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink::new());

        let registry = Arc::new(PatternRegistry::builtin()?);
        info!("Pattern registry loaded with {} profiles", registry.len());
        let detector = Arc::new(Detector::new(registry, self.config.detection.clone())?);

        let store = self.config.bundle_store()?;
        info!("Bundle store: {}", store.root().display());
        let loader = Arc::new(Loader::new(
            Arc::new(store),
            self.config.bundles.limits,
            Arc::clone(&audit),
        )?);

        let mut session = Session::new(
            detector,
            loader,
            self.config.consumer()?,
            self.config.pipeline,
            audit,
        )?;

        let workspace = self.config.workspace();
        info!(
            "Resolving {} tier for workspace {}",
            self.config.request.tier,
            workspace.display()
        );

        let report = tokio::select! {
            report = session.request_with_deadline(workspace, self.config.request.tier) => report?,
            _ = signal::ctrl_c() => {
                warn!("Interrupted, nothing served");
                return Ok(());
            }
        };

        let report = self.settle(&mut session, report).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    /// Answer a pending fallback with the configured policy
    async fn settle(
        &self,
        session: &mut Session,
        report: PipelineReport,
    ) -> Result<PipelineReport> {
        let PipelineOutcome::PendingFallback(pending) = &report.outcome else {
            return Ok(report);
        };

        let choice = match self.config.request.on_fallback {
            FallbackPolicy::Generic => FallbackChoice::Generic,
            FallbackPolicy::Abort => FallbackChoice::Abort,
        };
        info!(
            "Fallback pending ({}), applying configured '{}'",
            pending.error.code,
            choice.option()
        );
        Ok(session.resume_with_deadline(pending, choice).await?)
    }
}
