//! Version triples and compatibility ranges
//!
//! The grammar is closed: a version is exactly `MAJOR.MINOR.PATCH` in decimal,
//! and a range uses one of five operators. Anything else is rejected rather
//! than interpreted.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing versions or ranges
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// Not a `MAJOR.MINOR.PATCH` triple
    #[error("invalid version '{0}' (expected MAJOR.MINOR.PATCH)")]
    InvalidVersion(String),

    /// Operator outside the supported set
    #[error("unrecognized range operator '{0}'")]
    UnknownOperator(String),

    /// Range requires a minimum version but none was given
    #[error("range operator '{0}' requires a minimum version")]
    MissingMin(RangeOperator),

    /// Range declared as something other than a string or operator table
    #[error("unsupported range declaration {0}")]
    UnsupportedRange(String),

    /// Ceiling is not above the minimum
    #[error("range ceiling {max} is not above minimum {min}")]
    EmptyRange {
        /// Minimum version
        min: Version,
        /// Exclusive ceiling
        max: Version,
    },
}

/// Totally ordered `(major, minor, patch)` triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major component
    pub major: u64,
    /// Minor component
    pub minor: u64,
    /// Patch component
    pub patch: u64,
}

impl Version {
    /// Build a version from its components
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::InvalidVersion(s.to_string());
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }

        let mut components = [0u64; 3];
        for (slot, part) in components.iter_mut().zip(&parts) {
            let leading_zero = part.len() > 1 && part.starts_with('0');
            if part.is_empty() || leading_zero || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }

        Ok(Self::new(components[0], components[1], components[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Closed set of range operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RangeOperator {
    /// Version equals `min`
    Exact,
    /// Version is `>= min`
    AtLeast,
    /// Same major as `min` and `>= min`
    SameMajor,
    /// Same major.minor as `min` and `>= min`
    SameMinor,
    /// Every version
    Any,
}

impl RangeOperator {
    /// Operator name as written in table-form ranges
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RangeOperator::Exact => "exact",
            RangeOperator::AtLeast => "at-least",
            RangeOperator::SameMajor => "same-major",
            RangeOperator::SameMinor => "same-minor",
            RangeOperator::Any => "any",
        }
    }
}

impl fmt::Display for RangeOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeOperator {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(RangeOperator::Exact),
            "at-least" => Ok(RangeOperator::AtLeast),
            "same-major" => Ok(RangeOperator::SameMajor),
            "same-minor" => Ok(RangeOperator::SameMinor),
            "any" => Ok(RangeOperator::Any),
            other => Err(VersionError::UnknownOperator(other.to_string())),
        }
    }
}

/// Version constraint binding a bundle to one consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompatibilityRange {
    /// Operator applied to `min`
    pub operator: RangeOperator,
    /// Lower bound (absent only for `any`)
    pub min: Option<Version>,
    /// Exclusive ceiling
    pub max: Option<Version>,
    /// Version the bundle was authored against
    pub recommended: Option<Version>,
}

impl CompatibilityRange {
    /// Parse the string form: `1.2.3`, `=1.2.3`, `>=1.2.3`, `^1.2.3`, `~1.2.3` or `*`
    pub fn parse_expr(expr: &str) -> Result<Self, VersionError> {
        if expr == "*" {
            return Ok(Self::any());
        }

        let (operator, rest) = if let Some(rest) = expr.strip_prefix(">=") {
            (RangeOperator::AtLeast, rest)
        } else if let Some(rest) = expr.strip_prefix('^') {
            (RangeOperator::SameMajor, rest)
        } else if let Some(rest) = expr.strip_prefix('~') {
            (RangeOperator::SameMinor, rest)
        } else if let Some(rest) = expr.strip_prefix('=') {
            (RangeOperator::Exact, rest)
        } else if expr.starts_with(|c: char| c.is_ascii_digit()) {
            (RangeOperator::Exact, expr)
        } else {
            let op: String = expr
                .chars()
                .take_while(|c| !c.is_ascii_digit())
                .collect();
            return Err(VersionError::UnknownOperator(op));
        };

        Ok(Self {
            operator,
            min: Some(rest.parse()?),
            max: None,
            recommended: None,
        })
    }

    /// Build from the table form's fields
    pub fn from_parts(
        operator: &str,
        min: Option<&str>,
        max: Option<&str>,
        recommended: Option<&str>,
    ) -> Result<Self, VersionError> {
        let operator: RangeOperator = operator.parse()?;
        let min = min.map(str::parse::<Version>).transpose()?;
        let max = max.map(str::parse::<Version>).transpose()?;
        let recommended = recommended.map(str::parse::<Version>).transpose()?;

        if operator != RangeOperator::Any && min.is_none() {
            return Err(VersionError::MissingMin(operator));
        }
        if let (Some(min), Some(max)) = (min, max) {
            if max <= min {
                return Err(VersionError::EmptyRange { min, max });
            }
        }

        Ok(Self {
            operator,
            min,
            max,
            recommended,
        })
    }

    /// Range accepting every version
    #[must_use]
    pub fn any() -> Self {
        Self {
            operator: RangeOperator::Any,
            min: None,
            max: None,
            recommended: None,
        }
    }

    /// Whether `version` satisfies the range
    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        let base = match (self.operator, self.min) {
            (RangeOperator::Any, _) => true,
            (_, None) => false,
            (RangeOperator::Exact, Some(min)) => *version == min,
            (RangeOperator::AtLeast, Some(min)) => *version >= min,
            (RangeOperator::SameMajor, Some(min)) => {
                version.major == min.major && *version >= min
            }
            (RangeOperator::SameMinor, Some(min)) => {
                version.major == min.major && version.minor == min.minor && *version >= min
            }
        };

        base && self.max.map_or(true, |max| *version < max)
    }
}

impl fmt::Display for CompatibilityRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operator)?;
        if let Some(min) = self.min {
            write!(f, " {min}")?;
        }
        if let Some(max) = self.max {
            write!(f, " <{max}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_version_grammar() {
        assert_eq!(v("3.0.0"), Version::new(3, 0, 0));
        assert_eq!(v("10.20.30"), Version::new(10, 20, 30));
        assert_eq!(v("0.0.0"), Version::new(0, 0, 0));
        for bad in [
            "", "3", "3.0", "3.0.0.0", "v3.0.0", "3.0.0-beta", "3.0.x", " 3.0.0", "3..0", "+1.0.0",
            "1.0.0 ", "01.2.3", "1.02.3", "1.2.03", "00.0.0",
        ] {
            assert!(bad.parse::<Version>().is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_version_ordering() {
        assert!(v("2.9.0") < v("3.0.0"));
        assert!(v("3.0.10") > v("3.0.9"));
        assert!(v("3.10.0") > v("3.9.99"));
    }

    #[test]
    fn test_at_least() {
        let range = CompatibilityRange::parse_expr(">=3.0.0").unwrap();
        assert!(!range.contains(&v("2.9.0")));
        assert!(range.contains(&v("3.0.0")));
        assert!(range.contains(&v("4.1.0")));
    }

    #[test]
    fn test_exact() {
        for expr in ["1.2.3", "=1.2.3"] {
            let range = CompatibilityRange::parse_expr(expr).unwrap();
            assert_eq!(range.operator, RangeOperator::Exact);
            assert!(range.contains(&v("1.2.3")));
            assert!(!range.contains(&v("1.2.4")));
        }
    }

    #[test]
    fn test_same_major_and_minor() {
        let major = CompatibilityRange::parse_expr("^2.1.0").unwrap();
        assert!(major.contains(&v("2.1.0")));
        assert!(major.contains(&v("2.9.9")));
        assert!(!major.contains(&v("2.0.9")));
        assert!(!major.contains(&v("3.0.0")));

        let minor = CompatibilityRange::parse_expr("~2.1.3").unwrap();
        assert!(minor.contains(&v("2.1.3")));
        assert!(minor.contains(&v("2.1.9")));
        assert!(!minor.contains(&v("2.1.2")));
        assert!(!minor.contains(&v("2.2.0")));
    }

    #[test]
    fn test_any() {
        let range = CompatibilityRange::parse_expr("*").unwrap();
        assert!(range.contains(&v("0.0.0")));
        assert!(range.contains(&v("99.0.0")));
    }

    #[test]
    fn test_unknown_operators_rejected() {
        for expr in [">2.0.0", "<=2.0.0", "!=1.0.0", "latest", "", "=>1.0.0"] {
            assert!(
                CompatibilityRange::parse_expr(expr).is_err(),
                "{expr:?} accepted"
            );
        }
        assert!(matches!(
            CompatibilityRange::parse_expr(">2.0.0"),
            Err(VersionError::UnknownOperator(op)) if op == ">"
        ));
    }

    #[test]
    fn test_table_form_with_ceiling() {
        let range =
            CompatibilityRange::from_parts("at-least", Some("2.0.0"), Some("3.0.0"), Some("2.4.0"))
                .unwrap();
        assert!(range.contains(&v("2.0.0")));
        assert!(range.contains(&v("2.99.0")));
        assert!(!range.contains(&v("3.0.0")));
        assert_eq!(range.recommended, Some(v("2.4.0")));
    }

    #[test]
    fn test_table_form_validation() {
        assert!(matches!(
            CompatibilityRange::from_parts("greater", Some("1.0.0"), None, None),
            Err(VersionError::UnknownOperator(_))
        ));
        assert!(matches!(
            CompatibilityRange::from_parts("at-least", None, None, None),
            Err(VersionError::MissingMin(RangeOperator::AtLeast))
        ));
        assert!(matches!(
            CompatibilityRange::from_parts("at-least", Some("2.0.0"), Some("2.0.0"), None),
            Err(VersionError::EmptyRange { .. })
        ));
        assert!(CompatibilityRange::from_parts("any", None, None, None).is_ok());
    }
}
