//! Bundle/consumer compatibility resolution

use crate::bundle::BundleMetadata;
use crate::version::{CompatibilityRange, Version, VersionError};
use thiserror::Error;
use tracing::debug;

/// Why a bundle cannot serve a consumer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Incompatibility {
    /// Bundle declares nothing for this consumer
    #[error("bundle declares no range for consumer '{0}'")]
    NoRange(String),

    /// Declared range is outside the grammar
    #[error("declared range for consumer '{consumer}' is invalid: {source}")]
    InvalidRange {
        /// Consumer id
        consumer: String,
        /// Parse failure
        #[source]
        source: VersionError,
    },

    /// Consumer version is outside the grammar
    #[error("consumer version is invalid: {0}")]
    InvalidVersion(#[source] VersionError),

    /// Consumer version does not satisfy the range
    #[error("consumer version {version} is outside {range}")]
    OutOfRange {
        /// Consumer version
        version: Version,
        /// Declared range
        range: CompatibilityRange,
    },
}

/// Evaluates declared ranges against consumer versions
///
/// Fails closed: anything it cannot interpret is incompatible.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompatibilityResolver;

impl CompatibilityResolver {
    /// Create a resolver
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Whether the bundle supports `consumer_id` at `consumer_version`
    #[must_use]
    pub fn check(
        &self,
        metadata: &BundleMetadata,
        consumer_id: &str,
        consumer_version: &str,
    ) -> bool {
        match self.explain(metadata, consumer_id, consumer_version) {
            Ok(()) => true,
            Err(reason) => {
                debug!(
                    "Bundle '{}' incompatible with {}@{}: {}",
                    metadata.id, consumer_id, consumer_version, reason
                );
                false
            }
        }
    }

    /// Like [`check`](Self::check), with the reason for a negative verdict
    pub fn explain(
        &self,
        metadata: &BundleMetadata,
        consumer_id: &str,
        consumer_version: &str,
    ) -> Result<(), Incompatibility> {
        let raw = metadata
            .compatible_agents
            .get(consumer_id)
            .ok_or_else(|| Incompatibility::NoRange(consumer_id.to_string()))?;

        let range = raw.resolve().map_err(|source| Incompatibility::InvalidRange {
            consumer: consumer_id.to_string(),
            source,
        })?;

        let version: Version = consumer_version
            .parse()
            .map_err(Incompatibility::InvalidVersion)?;

        if range.contains(&version) {
            Ok(())
        } else {
            Err(Incompatibility::OutOfRange { version, range })
        }
    }

    /// Version the bundle was authored against for `consumer_id`, if declared
    #[must_use]
    pub fn recommended(&self, metadata: &BundleMetadata, consumer_id: &str) -> Option<Version> {
        metadata
            .compatible_agents
            .get(consumer_id)?
            .resolve()
            .ok()?
            .recommended
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::bundle::parse_metadata;

    fn metadata(ranges: &str) -> BundleMetadata {
        let header = format!(
            "id: react-framework\nversion: 1.0.0\nprofile: react-framework\ncompatible_agents:\n{ranges}"
        );
        parse_metadata("react-framework", &header).unwrap()
    }

    #[test]
    fn test_at_least_boundary() {
        let meta = metadata("  consumerX: \">=3.0.0\"\n");
        let resolver = CompatibilityResolver::new();
        assert!(!resolver.check(&meta, "consumerX", "2.9.0"));
        assert!(resolver.check(&meta, "consumerX", "3.0.0"));
    }

    #[test]
    fn test_old_consumer_rejected() {
        let meta = metadata("  consumerX: \">=2.0.0\"\n");
        let resolver = CompatibilityResolver::new();
        assert!(!resolver.check(&meta, "consumerX", "1.5.0"));
        assert!(matches!(
            resolver.explain(&meta, "consumerX", "1.5.0"),
            Err(Incompatibility::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_fails_closed() {
        let meta = metadata("  consumerX: \">2.0.0\"\n  other: \"*\"\n");
        let resolver = CompatibilityResolver::new();

        assert!(matches!(
            resolver.explain(&meta, "consumerX", "3.0.0"),
            Err(Incompatibility::InvalidRange { .. })
        ));
        assert!(matches!(
            resolver.explain(&meta, "unknown", "3.0.0"),
            Err(Incompatibility::NoRange(_))
        ));
        assert!(matches!(
            resolver.explain(&meta, "other", "v3.0.0"),
            Err(Incompatibility::InvalidVersion(_))
        ));
        assert!(resolver.check(&meta, "other", "0.1.0"));
    }

    #[test]
    fn test_scalar_range_is_incompatible() {
        let meta = metadata("  consumerX: 2\n");
        let resolver = CompatibilityResolver::new();
        assert!(!resolver.check(&meta, "consumerX", "2.0.0"));
        assert!(matches!(
            resolver.explain(&meta, "consumerX", "2.0.0"),
            Err(Incompatibility::InvalidRange { .. })
        ));
        assert!(!resolver.check(&metadata("  consumerX: \">=01.0.0\"\n"), "consumerX", "2.0.0"));
    }

    #[test]
    fn test_recommended() {
        let meta = metadata(
            "  reviewer:\n    operator: same-major\n    min: 2.0.0\n    recommended: 2.3.1\n  consumerX: \">=1.0.0\"\n",
        );
        let resolver = CompatibilityResolver::new();
        assert_eq!(
            resolver.recommended(&meta, "reviewer"),
            Some(Version::new(2, 3, 1))
        );
        assert_eq!(resolver.recommended(&meta, "consumerX"), None);
        assert!(resolver.check(&meta, "reviewer", "2.9.0"));
        assert!(!resolver.check(&meta, "reviewer", "3.0.0"));
    }
}
