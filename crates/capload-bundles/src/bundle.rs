//! Bundle identifiers and metadata headers
//!
//! Each bundle is a folder holding one Markdown file per tier. Every tier file
//! opens with a YAML frontmatter header declaring the bundle's version, profile
//! and per-consumer compatibility ranges.

use crate::error::{LoadError, Result};
use crate::version::{CompatibilityRange, Version, VersionError};
use capload_types::CandidateId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Maximum allowed bundle id length
const MAX_ID_LENGTH: usize = 64;
/// Maximum description length before a warning is logged
const MAX_DESCRIPTION_LENGTH: usize = 1024;

/// Sequences that can move a path outside the store root
const TRAVERSAL_MARKERS: &[&str] = &["..", "/", "\\", ":", "\0", "%2e", "%2f", "%5c", "%00"];

/// Compatibility range exactly as declared in a header
///
/// Interpretation is deferred to the compatibility resolver, so a malformed
/// range makes the bundle incompatible rather than unloadable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawRange {
    /// String form, e.g. `">=2.0.0"`
    Expr(String),
    /// Table form
    Table {
        /// Operator name, e.g. `at-least`
        operator: String,
        /// Lower bound
        #[serde(default)]
        min: Option<String>,
        /// Exclusive ceiling
        #[serde(default)]
        max: Option<String>,
        /// Version the bundle was authored against
        #[serde(default)]
        recommended: Option<String>,
    },
    /// Any other YAML value; never resolves
    Other(serde_yaml::Value),
}

impl RawRange {
    /// Interpret the declared range
    pub fn resolve(&self) -> std::result::Result<CompatibilityRange, VersionError> {
        match self {
            RawRange::Expr(expr) => CompatibilityRange::parse_expr(expr),
            RawRange::Table {
                operator,
                min,
                max,
                recommended,
            } => CompatibilityRange::from_parts(
                operator,
                min.as_deref(),
                max.as_deref(),
                recommended.as_deref(),
            ),
            RawRange::Other(value) => Err(VersionError::UnsupportedRange(describe(value))),
        }
    }
}

fn describe(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => "null".to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => format!("'{s}'"),
        serde_yaml::Value::Sequence(_) => "(sequence)".to_string(),
        serde_yaml::Value::Mapping(_) => "(mapping without operator)".to_string(),
        serde_yaml::Value::Tagged(tagged) => format!("(tagged {})", tagged.tag),
    }
}

/// Header fields as written by the authoring pipeline
#[derive(Debug, Deserialize)]
struct RawHeader {
    id: String,
    version: String,
    profile: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    compatible_agents: BTreeMap<String, RawRange>,
}

/// Validated bundle metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleMetadata {
    /// Bundle id, equal to the requested id
    pub id: CandidateId,
    /// Bundle version
    pub version: Version,
    /// Profile the bundle declares it serves
    pub profile: CandidateId,
    /// Optional one-line description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Consumer id to declared range
    pub compatible_agents: BTreeMap<String, RawRange>,
}

/// Frontmatter splitter and id validator
#[derive(Debug, Clone)]
pub struct BundleParser {
    frontmatter: Regex,
    id: Regex,
}

impl BundleParser {
    /// Compile the header and id patterns
    pub fn new() -> Result<Self> {
        Ok(Self {
            frontmatter: Regex::new(r"(?s)\A---[ \t]*\r?\n(.*?)\r?\n---[ \t]*(?:\r?\n(.*))?\z")?,
            id: Regex::new(r"^[a-z0-9][a-z0-9._-]*$")?,
        })
    }

    /// Gate a requested id before it is used to build any path
    pub fn check_id(&self, id: &str) -> Result<()> {
        let lowered = id.to_ascii_lowercase();
        if TRAVERSAL_MARKERS.iter().any(|m| lowered.contains(m))
            || id.starts_with('~')
            || Path::new(id).is_absolute()
        {
            return Err(LoadError::PathTraversal(id.to_string()));
        }

        if id.is_empty() || id.len() > MAX_ID_LENGTH || !self.id.is_match(id) {
            return Err(LoadError::InvalidId(id.to_string()));
        }

        Ok(())
    }

    /// Split a tier file into `(header, body)`; `None` when there is no header
    #[must_use]
    pub fn split<'a>(&self, content: &'a str) -> Option<(&'a str, &'a str)> {
        let captures = self.frontmatter.captures(content)?;
        let header = captures.get(1)?.as_str();
        let body = captures.get(2).map_or("", |m| m.as_str());
        Some((header, body))
    }
}

/// Parse and validate a header for the bundle `expected_id`
pub fn parse_metadata(expected_id: &str, header: &str) -> Result<BundleMetadata> {
    let invalid = |reason: String| LoadError::Metadata {
        id: expected_id.to_string(),
        reason,
    };

    let raw: RawHeader = serde_yaml::from_str(header)
        .map_err(|e| invalid(format!("failed to parse YAML header: {e}")))?;

    if raw.id != expected_id {
        return Err(invalid(format!(
            "header declares id '{}', expected '{}'",
            raw.id, expected_id
        )));
    }

    let version: Version = raw
        .version
        .parse()
        .map_err(|e: VersionError| invalid(e.to_string()))?;

    if raw.profile.trim().is_empty() {
        return Err(invalid("profile cannot be empty".to_string()));
    }

    if let Some(key) = raw
        .compatible_agents
        .keys()
        .find(|k| k.is_empty() || k.chars().any(char::is_whitespace))
    {
        return Err(invalid(format!("invalid consumer id '{key}'")));
    }

    if let Some(description) = &raw.description {
        if description.len() > MAX_DESCRIPTION_LENGTH {
            warn!(
                "Bundle '{}' description exceeds {} characters (was {})",
                expected_id,
                MAX_DESCRIPTION_LENGTH,
                description.len()
            );
        }
    }

    Ok(BundleMetadata {
        id: CandidateId::new(raw.id),
        version,
        profile: CandidateId::new(raw.profile),
        description: raw.description,
        compatible_agents: raw.compatible_agents,
    })
}
