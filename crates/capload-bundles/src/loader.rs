//! Bundle loader
//!
//! Turns a `(bundle id, tier)` request into sanitized content plus validated
//! metadata. Each step is a hard gate, in order:
//!
//! 1. The id is checked for traversal sequences before any path is built
//! 2. Raw bytes are read (one retry on transient I/O failure)
//! 3. Content over the tier ceiling is discarded
//! 4. The Markdown body is sanitized
//! 5. The frontmatter header is parsed and validated
//!
//! Nothing partial is ever returned. [`Loader::load`] sends every sanitizer
//! removal to the audit sink once all gates pass; callers that may abandon a
//! load use [`Loader::prepare`] and record the removals only for results
//! they keep.

use crate::bundle::{parse_metadata, BundleMetadata, BundleParser};
use crate::config::LoaderLimits;
use crate::error::{is_transient, LoadError, Result};
use crate::sanitize::{Removal, Sanitizer};
use crate::store::{BundleStore, StoreError};
use capload_types::{AuditEvent, AuditSink, CandidateId, Tier};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sanitized bundle tier ready to serve
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedBundle {
    /// Bundle id
    pub id: CandidateId,
    /// Tier this content belongs to
    pub tier: Tier,
    /// Sanitized Markdown body
    pub content: String,
    /// Validated header
    pub metadata: BundleMetadata,
    /// Constructs stripped by the sanitizer
    pub removals: Vec<Removal>,
}

/// Loads bundles from a read-only store
pub struct Loader {
    store: Arc<dyn BundleStore>,
    limits: LoaderLimits,
    parser: BundleParser,
    sanitizer: Sanitizer,
    audit: Arc<dyn AuditSink>,
}

impl Loader {
    /// Create a loader over `store`
    pub fn new(
        store: Arc<dyn BundleStore>,
        limits: LoaderLimits,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        limits.validate()?;
        Ok(Self {
            store,
            limits,
            parser: BundleParser::new()?,
            sanitizer: Sanitizer::new()?,
            audit,
        })
    }

    /// Configured tier ceilings
    #[must_use]
    pub fn limits(&self) -> &LoaderLimits {
        &self.limits
    }

    /// Root of the underlying store
    #[must_use]
    pub fn store_root(&self) -> &Path {
        self.store.root()
    }

    /// Load one tier of a bundle and audit its sanitizer removals
    pub fn load(&self, id: &CandidateId, tier: Tier) -> Result<LoadedBundle> {
        let bundle = self.prepare(id, tier)?;
        self.record_removals(&bundle);
        Ok(bundle)
    }

    /// Send a loaded bundle's sanitizer removals to the audit sink
    pub fn record_removals(&self, bundle: &LoadedBundle) {
        for removal in &bundle.removals {
            self.audit.record(AuditEvent::SanitizationRemoval {
                bundle_id: bundle.id.clone(),
                tier: bundle.tier,
                kind: removal.kind,
                offset: removal.offset,
                excerpt: removal.excerpt.clone(),
            });
        }
    }

    /// Run every gate for one tier of a bundle without auditing
    pub fn prepare(&self, id: &CandidateId, tier: Tier) -> Result<LoadedBundle> {
        if let Err(e) = self.parser.check_id(id.as_str()) {
            warn!("Rejected bundle id {:?}: {}", id.as_str(), e);
            return Err(e);
        }

        let limit = self.limits.for_tier(tier);
        let relative = PathBuf::from(id.as_str()).join(tier.file_name());
        let bytes = self.read_with_retry(id, tier, &relative, limit)?;

        if u64::try_from(bytes.len()).unwrap_or(u64::MAX) > limit {
            warn!(
                "Bundle '{}' {} tier exceeds {} bytes, discarding",
                id, tier, limit
            );
            return Err(LoadError::SizeLimit {
                id: id.to_string(),
                tier,
                limit,
            });
        }

        let text = String::from_utf8(bytes).map_err(|e| LoadError::Sanitization {
            id: id.to_string(),
            reason: format!("content is not valid UTF-8: {e}"),
        })?;

        let (header, body) = self.parser.split(&text).ok_or_else(|| LoadError::Metadata {
            id: id.to_string(),
            reason: "missing frontmatter header".to_string(),
        })?;

        let sanitized = self
            .sanitizer
            .sanitize(body)
            .map_err(|e| LoadError::Sanitization {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        let metadata = parse_metadata(id.as_str(), header)?;

        info!(
            "Loaded {} tier of bundle '{}' v{} ({} bytes, {} removals)",
            tier,
            id,
            metadata.version,
            sanitized.content.len(),
            sanitized.removals.len()
        );

        Ok(LoadedBundle {
            id: id.clone(),
            tier,
            content: sanitized.content,
            metadata,
            removals: sanitized.removals,
        })
    }

    fn read_with_retry(
        &self,
        id: &CandidateId,
        tier: Tier,
        relative: &Path,
        limit: u64,
    ) -> Result<Vec<u8>> {
        match self.store.read(relative, limit) {
            Ok(bytes) => Ok(bytes),
            Err(StoreError::Io(e)) if is_transient(&e) => {
                warn!(
                    "Transient read failure for bundle '{}' ({} tier): {}, retrying once",
                    id, tier, e
                );
                self.store
                    .read(relative, limit)
                    .map_err(|e| store_failure(id, tier, e))
            }
            Err(e) => Err(store_failure(id, tier, e)),
        }
    }
}

fn store_failure(id: &CandidateId, tier: Tier, err: StoreError) -> LoadError {
    match err {
        StoreError::Escape(path) => {
            warn!("Bundle '{}' resolves outside the store: {:?}", id, path);
            LoadError::PathTraversal(id.to_string())
        }
        StoreError::Io(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Bundle '{}' has no {} tier", id, tier);
            LoadError::NotFound {
                id: id.to_string(),
                tier,
            }
        }
        StoreError::Io(source) => LoadError::Io {
            id: id.to_string(),
            source,
        },
    }
}
