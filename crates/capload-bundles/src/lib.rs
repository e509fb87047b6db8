//! Capability bundle loading
//!
//! Serves versioned capability bundles under a two-tier progressive
//! disclosure protocol: a small summary tier for every request and a larger
//! detail tier only when asked for.
//!
//! ## Components
//!
//! - [`Loader`]: id gate, tier size ceilings, sanitization, metadata parsing
//! - [`CompatibilityResolver`]: closed range grammar over version triples
//! - [`BundleCache`]: per-session LRU keyed by bundle id and tier
//!
//! ## Store layout
//!
//! ```text
//! <root>/<bundle-id>/summary.md
//! <root>/<bundle-id>/detail.md
//! ```
//!
//! Each tier file opens with a YAML frontmatter header (id, version, profile,
//! compatibility ranges) followed by the Markdown body.

#![deny(unsafe_code, dead_code, unused_imports, unused_variables, missing_docs)]

pub mod bundle;
pub mod cache;
pub mod compat;
pub mod config;
pub mod error;
pub mod loader;
pub mod sanitize;
pub mod store;
pub mod version;

pub use bundle::{BundleMetadata, RawRange};
pub use cache::{BundleCache, CacheEntry};
pub use compat::{CompatibilityResolver, Incompatibility};
pub use config::{CacheConfig, LoaderLimits};
pub use error::{LoadError, Result};
pub use loader::{LoadedBundle, Loader};
pub use sanitize::{Removal, Sanitizer};
pub use store::{BundleStore, FsBundleStore, StoreError};
pub use version::{CompatibilityRange, RangeOperator, Version, VersionError};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BundleCache, BundleStore, CacheConfig, CompatibilityResolver, FsBundleStore, LoadError,
        LoadedBundle, Loader, LoaderLimits,
    };
}
