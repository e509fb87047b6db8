//! Per-session request pipeline
//!
//! A [`Session`] is the explicit context for one caller: it owns its bundle
//! cache and shares only immutable collaborators (registry, loader, audit
//! sink) with other sessions. Dropping the session tears the cache down.
//!
//! Each request walks `DETECTING -> LOADING -> SERVED`, leaving the happy path
//! through the fallback controller whenever detection is not conclusive or a
//! load cannot be served. Nothing is written to the cache unless the request
//! ends in `SERVED`.

use crate::config::{Consumer, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::fallback::{FallbackController, PendingFallback};
use capload_bundles::{
    BundleCache, BundleMetadata, CompatibilityResolver, LoadError, LoadedBundle, Loader,
};
use capload_detect::{DetectError, Detector};
use capload_types::{
    AuditEvent, AuditSink, CandidateId, DetectionResult, DetectionStatus, ErrorCode, ErrorResult,
    FallbackChoice, FallbackTrigger, Tier,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// States a request passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// Request accepted
    Idle,
    /// Workspace being inspected
    Detecting,
    /// One candidate detected with confidence
    Resolved,
    /// Candidates competed for the top spot
    Ambiguous,
    /// No candidate cleared the threshold
    #[serde(rename = "NONE")]
    NoMatch,
    /// Bundle being looked up or read
    Loading,
    /// Bundle read, sanitized and parsed
    Loaded,
    /// Bundle over its tier ceiling
    SizeExceeded,
    /// Bundle could not be sanitized safely
    SanitizationFailed,
    /// Bundle missing, unreadable or with invalid metadata
    LoadFailed,
    /// Bundle does not support the consumer
    Incompatible,
    /// Pipeline deadline expired
    DeadlineExpired,
    /// Content returned to the caller
    Served,
    /// Request suspended for a caller decision
    FallbackEngaged,
    /// Caller chose to proceed without a bundle
    Generic,
    /// Caller chose to abort
    Aborted,
    /// Request failed on a non-recoverable input error
    Rejected,
}

impl PipelineState {
    fn after_load_error(err: &LoadError) -> Self {
        match err.code() {
            ErrorCode::SizeLimitExceeded => PipelineState::SizeExceeded,
            ErrorCode::SanitizationFailed => PipelineState::SanitizationFailed,
            _ => PipelineState::LoadFailed,
        }
    }
}

/// Content served for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadResult {
    /// Sanitized content
    pub content: String,
    /// Bundle metadata
    pub metadata: BundleMetadata,
    /// Whether the session cache satisfied the request
    pub cached: bool,
    /// Tier served
    pub tier: Tier,
}

/// How a request ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Content was served
    Served(LoadResult),
    /// Waiting for the caller to resolve a fallback
    PendingFallback(PendingFallback),
    /// Caller proceeds without a bundle
    Generic,
    /// Caller aborted the task
    Aborted,
    /// Input error; no fallback is offered
    Rejected(ErrorResult),
}

/// Outcome of one request plus the states it visited
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    /// Request id, shared with any fallback decision
    pub request_id: Uuid,
    /// Terminal outcome
    pub outcome: PipelineOutcome,
    /// Visited states, in order
    pub trail: Vec<PipelineState>,
}

impl PipelineReport {
    /// Served content, if any
    #[must_use]
    pub fn served(&self) -> Option<&LoadResult> {
        match &self.outcome {
            PipelineOutcome::Served(result) => Some(result),
            _ => None,
        }
    }

    /// Pending fallback, if the request is suspended
    #[must_use]
    pub fn pending(&self) -> Option<&PendingFallback> {
        match &self.outcome {
            PipelineOutcome::PendingFallback(pending) => Some(pending),
            _ => None,
        }
    }
}

/// In-flight request bookkeeping
struct Run {
    request_id: Uuid,
    tier: Tier,
    trail: Vec<PipelineState>,
}

impl Run {
    fn new(request_id: Uuid, tier: Tier) -> Self {
        Self {
            request_id,
            tier,
            trail: vec![PipelineState::Idle],
        }
    }

    fn push(&mut self, state: PipelineState) {
        self.trail.push(state);
    }

    fn finish(mut self, state: PipelineState, outcome: PipelineOutcome) -> PipelineReport {
        self.trail.push(state);
        PipelineReport {
            request_id: self.request_id,
            outcome,
            trail: self.trail,
        }
    }
}

/// Per-session capability resolution context
pub struct Session {
    id: Uuid,
    detector: Arc<Detector>,
    loader: Arc<Loader>,
    resolver: CompatibilityResolver,
    cache: BundleCache,
    consumer: Consumer,
    fallback: FallbackController,
    audit: Arc<dyn AuditSink>,
    config: PipelineConfig,
}

impl Session {
    /// Open a session for `consumer`
    pub fn new(
        detector: Arc<Detector>,
        loader: Arc<Loader>,
        consumer: Consumer,
        config: PipelineConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        config.validate()?;
        let cache =
            BundleCache::new(config.cache).map_err(|e| PipelineError::Config(e.to_string()))?;
        let id = Uuid::new_v4();
        info!("Opened session {} for consumer {}", id, consumer);

        Ok(Self {
            id,
            detector,
            loader,
            resolver: CompatibilityResolver::new(),
            cache,
            consumer,
            fallback: FallbackController::new(Arc::clone(&audit)),
            audit,
            config,
        })
    }

    /// Session id
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Consumer this session serves
    #[must_use]
    pub fn consumer(&self) -> &Consumer {
        &self.consumer
    }

    /// The session's cache
    #[must_use]
    pub fn cache(&self) -> &BundleCache {
        &self.cache
    }

    /// Detect the workspace profile and serve its bundle at `tier`
    ///
    /// Fails only on input errors (a workspace root that cannot be
    /// inspected); everything else is reported as an outcome.
    pub fn request(&mut self, root: &Path, tier: Tier) -> Result<PipelineReport> {
        let mut run = Run::new(Uuid::new_v4(), tier);
        run.push(PipelineState::Detecting);

        let detection = self
            .detector
            .detect(root)
            .map_err(|e| self.detection_failed(root, e))?;
        match self.select(run, root, detection) {
            Ok((run, candidate)) => Ok(self.serve(run, &candidate)),
            Err(report) => Ok(report),
        }
    }

    /// Serve the detail tier of a bundle resolved by an earlier request
    pub fn request_detail(&mut self, bundle_id: &CandidateId) -> PipelineReport {
        self.serve(Run::new(Uuid::new_v4(), Tier::Detail), bundle_id)
    }

    /// Continue a suspended request with the caller's choice
    pub fn resume(&mut self, pending: &PendingFallback, choice: FallbackChoice) -> PipelineReport {
        match self.decide(pending, choice) {
            Ok((run, candidate)) => self.serve(run, &candidate),
            Err(report) => report,
        }
    }

    /// [`request`](Self::request) under the session's overall deadline
    ///
    /// Detection and loading run on the blocking pool. When the deadline
    /// expires the in-flight work is abandoned, nothing is cached and the
    /// fallback controller is engaged.
    pub async fn request_with_deadline(
        &mut self,
        root: impl Into<PathBuf>,
        tier: Tier,
    ) -> Result<PipelineReport> {
        let root = root.into();
        let deadline = Instant::now() + self.config.deadline();
        let mut run = Run::new(Uuid::new_v4(), tier);
        run.push(PipelineState::Detecting);

        let detector = Arc::clone(&self.detector);
        let workspace = root.clone();
        let detection = match timeout_at(
            deadline,
            task::spawn_blocking(move || detector.detect(&workspace)),
        )
        .await
        {
            Ok(joined) => joined
                .map_err(|e| PipelineError::Task(e.to_string()))?
                .map_err(|e| self.detection_failed(&root, e))?,
            Err(_) => return Ok(self.expire(run)),
        };

        match self.select(run, &root, detection) {
            Ok((run, candidate)) => self.serve_until(run, candidate, deadline).await,
            Err(report) => Ok(report),
        }
    }

    /// [`request_detail`](Self::request_detail) under the session's overall deadline
    pub async fn request_detail_with_deadline(
        &mut self,
        bundle_id: &CandidateId,
    ) -> Result<PipelineReport> {
        let deadline = Instant::now() + self.config.deadline();
        let run = Run::new(Uuid::new_v4(), Tier::Detail);
        self.serve_until(run, bundle_id.clone(), deadline).await
    }

    /// [`resume`](Self::resume) with a manual retry bounded by the session's deadline
    pub async fn resume_with_deadline(
        &mut self,
        pending: &PendingFallback,
        choice: FallbackChoice,
    ) -> Result<PipelineReport> {
        let deadline = Instant::now() + self.config.deadline();
        match self.decide(pending, choice) {
            Ok((run, candidate)) => self.serve_until(run, candidate, deadline).await,
            Err(report) => Ok(report),
        }
    }

    /// Record a detection that could not run and hand back the error
    fn detection_failed(&self, root: &Path, err: DetectError) -> PipelineError {
        warn!("Detection failed for {}: {}", root.display(), err);
        self.audit.record(AuditEvent::DetectionFailed {
            workspace: root.display().to_string(),
            reason: err.to_string(),
        });
        PipelineError::Detect(err)
    }

    /// Record the caller's decision; a manual choice yields the run to serve
    fn decide(
        &self,
        pending: &PendingFallback,
        choice: FallbackChoice,
    ) -> std::result::Result<(Run, CandidateId), PipelineReport> {
        let decision = self.fallback.resolve(pending, choice);
        let mut run = Run::new(pending.request_id, pending.tier);

        match decision.choice {
            FallbackChoice::Generic => {
                Err(run.finish(PipelineState::Generic, PipelineOutcome::Generic))
            }
            FallbackChoice::Abort => {
                Err(run.finish(PipelineState::Aborted, PipelineOutcome::Aborted))
            }
            FallbackChoice::Manual { candidate_id, tier } => {
                run.tier = tier;
                Ok((run, candidate_id))
            }
        }
    }

    /// Record the detection attempt and pick the candidate to load
    fn select(
        &self,
        mut run: Run,
        root: &Path,
        detection: DetectionResult,
    ) -> std::result::Result<(Run, CandidateId), PipelineReport> {
        self.audit.record(AuditEvent::DetectionAttempted {
            workspace: root.display().to_string(),
            status: detection.status,
            primary: detection.primary.clone(),
            confidence: detection.confidence,
            alternates: detection.alternates.len(),
        });

        match (detection.status, detection.primary.clone()) {
            (DetectionStatus::Resolved, Some(primary)) => {
                debug!(
                    "Detected '{}' with confidence {:.2}",
                    primary, detection.confidence
                );
                run.push(PipelineState::Resolved);
                Ok((run, primary))
            }
            (DetectionStatus::Ambiguous, _) => {
                run.push(PipelineState::Ambiguous);
                let candidates: Vec<CandidateId> = detection
                    .alternates
                    .iter()
                    .map(|m| m.candidate_id.clone())
                    .collect();
                let message = format!(
                    "Detection is ambiguous between {}",
                    candidates
                        .iter()
                        .map(CandidateId::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                Err(self.engage(
                    run,
                    FallbackTrigger::Ambiguous { candidates },
                    message,
                    Some(detection),
                ))
            }
            _ => {
                run.push(PipelineState::NoMatch);
                let (trigger, message) = if detection.alternates.is_empty() {
                    (
                        FallbackTrigger::NoCandidate,
                        "No capability profile matched the workspace".to_string(),
                    )
                } else {
                    (
                        FallbackTrigger::LowConfidence,
                        format!(
                            "Best candidate scored {:.2}, below the {:.2} threshold",
                            detection.confidence,
                            self.detector.config().threshold
                        ),
                    )
                };
                Err(self.engage(run, trigger, message, Some(detection)))
            }
        }
    }

    /// Serve `bundle_id` from the cache or the loader
    fn serve(&mut self, mut run: Run, bundle_id: &CandidateId) -> PipelineReport {
        run.push(PipelineState::Loading);
        if let Some(bundle) = self.cached(bundle_id, run.tier) {
            return self.deliver(run, bundle, true);
        }
        let load = self.loader.load(bundle_id, run.tier);
        self.complete(run, load)
    }

    /// Serve `bundle_id`, loading on the blocking pool until `deadline`
    ///
    /// Removals are audited only for loads that finish in time; an abandoned
    /// load runs to completion unobserved.
    async fn serve_until(
        &mut self,
        mut run: Run,
        bundle_id: CandidateId,
        deadline: Instant,
    ) -> Result<PipelineReport> {
        run.push(PipelineState::Loading);
        if let Some(bundle) = self.cached(&bundle_id, run.tier) {
            return Ok(self.deliver(run, bundle, true));
        }

        let loader = Arc::clone(&self.loader);
        let tier = run.tier;
        let load = match timeout_at(
            deadline,
            task::spawn_blocking(move || loader.prepare(&bundle_id, tier)),
        )
        .await
        {
            Ok(joined) => joined.map_err(|e| PipelineError::Task(e.to_string()))?,
            Err(_) => return Ok(self.expire(run)),
        };

        if let Ok(bundle) = &load {
            self.loader.record_removals(bundle);
        }
        Ok(self.complete(run, load))
    }

    fn cached(&mut self, bundle_id: &CandidateId, tier: Tier) -> Option<LoadedBundle> {
        self.cache
            .get(bundle_id, tier)
            .map(|entry| entry.bundle.clone())
    }

    /// Gate a fresh load on compatibility, then deliver it
    fn complete(
        &mut self,
        mut run: Run,
        load: std::result::Result<LoadedBundle, LoadError>,
    ) -> PipelineReport {
        let bundle = match load {
            Ok(bundle) => bundle,
            Err(e) => {
                let code = e.code();
                if !code.is_recoverable() {
                    return self.reject(run, ErrorResult::new(code, e.to_string()));
                }
                run.push(PipelineState::after_load_error(&e));
                return self.engage(run, FallbackTrigger::LoadFailed { code }, e.to_string(), None);
            }
        };
        run.push(PipelineState::Loaded);

        if let Err(reason) =
            self.resolver
                .explain(&bundle.metadata, &self.consumer.id, &self.consumer.version)
        {
            run.push(PipelineState::Incompatible);
            let message = format!(
                "Bundle '{}' v{} does not support {}: {}",
                bundle.id, bundle.metadata.version, self.consumer, reason
            );
            return self.engage(run, FallbackTrigger::Incompatible, message, None);
        }

        self.deliver(run, bundle, false)
    }

    /// Terminal `SERVED`: commit to the cache if fresh and hand out the content
    fn deliver(&mut self, run: Run, bundle: LoadedBundle, cached: bool) -> PipelineReport {
        self.audit.record(AuditEvent::BundleServed {
            bundle_id: bundle.id.clone(),
            tier: bundle.tier,
            cached,
            bytes: bundle.content.len(),
        });

        let result = LoadResult {
            content: bundle.content.clone(),
            metadata: bundle.metadata.clone(),
            cached,
            tier: bundle.tier,
        };
        if !cached {
            self.cache.insert(bundle);
        }

        run.finish(PipelineState::Served, PipelineOutcome::Served(result))
    }

    fn engage(
        &self,
        run: Run,
        trigger: FallbackTrigger,
        message: String,
        detection: Option<DetectionResult>,
    ) -> PipelineReport {
        let pending = self
            .fallback
            .engage(run.request_id, trigger, message, run.tier, detection);
        run.finish(
            PipelineState::FallbackEngaged,
            PipelineOutcome::PendingFallback(pending),
        )
    }

    fn expire(&self, mut run: Run) -> PipelineReport {
        warn!(
            "Request {} exceeded the {} ms deadline",
            run.request_id, self.config.deadline_ms
        );
        run.push(PipelineState::DeadlineExpired);
        let message = format!(
            "Pipeline did not finish within {} ms",
            self.config.deadline_ms
        );
        self.engage(run, FallbackTrigger::DeadlineExpired, message, None)
    }

    fn reject(&self, run: Run, error: ErrorResult) -> PipelineReport {
        warn!("Request {} rejected: {}", run.request_id, error);
        self.audit.record(AuditEvent::RequestRejected {
            error: error.clone(),
        });
        run.finish(PipelineState::Rejected, PipelineOutcome::Rejected(error))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(
            "Closing session {} ({} cached entries dropped)",
            self.id,
            self.cache.len()
        );
    }
}
