//! Static table of capability profiles and the signals that identify them
//!
//! Supporting a new profile means adding a `ProfilePattern` entry here; the
//! detector itself never branches on profile identity.

use crate::error::RegistryError;
use capload_types::{CandidateId, SignalClass, SignalSource};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Component, Path};

/// Dependency manifest ecosystems understood by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Manifest {
    /// `package.json`
    Npm,
    /// `requirements.txt` or `pyproject.toml`
    Python,
    /// `Cargo.toml`
    Cargo,
    /// `Gemfile`
    Bundler,
    /// `composer.json`
    Composer,
}

impl Manifest {
    /// Every supported ecosystem
    pub const ALL: [Manifest; 5] = [
        Manifest::Npm,
        Manifest::Python,
        Manifest::Cargo,
        Manifest::Bundler,
        Manifest::Composer,
    ];

    /// Candidate manifest files, in lookup order
    #[must_use]
    pub fn file_names(self) -> &'static [&'static str] {
        match self {
            Manifest::Npm => &["package.json"],
            Manifest::Python => &["requirements.txt", "pyproject.toml"],
            Manifest::Cargo => &["Cargo.toml"],
            Manifest::Bundler => &["Gemfile"],
            Manifest::Composer => &["composer.json"],
        }
    }
}

/// What a signal checks for
#[derive(Debug, Clone)]
pub enum SignalKind {
    /// Any of the given files exists
    FileExists {
        /// Relative paths
        paths: Vec<String>,
    },
    /// Any of the given directories exists
    DirectoryExists {
        /// Relative paths
        paths: Vec<String>,
    },
    /// A manifest of the ecosystem declares the dependency
    ManifestDependency {
        /// Ecosystem
        manifest: Manifest,
        /// Dependency name, compared case-insensitively
        name: String,
    },
    /// A file's content matches a pattern
    FileContains {
        /// Relative path
        path: String,
        /// Compiled pattern
        pattern: Regex,
    },
    /// A file with the extension exists within the scan depth
    ExtensionPresent {
        /// Extension without the dot
        extension: String,
    },
}

impl SignalKind {
    /// `FileExists` over one or more paths
    pub fn file(paths: &[&str]) -> Self {
        SignalKind::FileExists {
            paths: paths.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    /// `DirectoryExists` over one or more paths
    pub fn dir(paths: &[&str]) -> Self {
        SignalKind::DirectoryExists {
            paths: paths.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    /// `ManifestDependency`
    pub fn dependency(manifest: Manifest, name: &str) -> Self {
        SignalKind::ManifestDependency {
            manifest,
            name: name.to_ascii_lowercase(),
        }
    }

    /// `FileContains`, compiling the pattern
    pub fn contains(path: &str, pattern: &str) -> Result<Self, RegistryError> {
        let pattern = Regex::new(pattern).map_err(|source| RegistryError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(SignalKind::FileContains {
            path: path.to_string(),
            pattern,
        })
    }

    /// `ExtensionPresent`
    pub fn extension(extension: &str) -> Self {
        SignalKind::ExtensionPresent {
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    /// Evidence source reported for a match of this kind
    #[must_use]
    pub fn source(&self) -> SignalSource {
        match self {
            SignalKind::FileExists { .. } => SignalSource::FileExistence,
            SignalKind::ManifestDependency { .. } | SignalKind::FileContains { .. } => {
                SignalSource::StructuredMatch
            }
            SignalKind::DirectoryExists { .. } | SignalKind::ExtensionPresent { .. } => {
                SignalSource::DirectoryPattern
            }
        }
    }

    fn paths(&self) -> Vec<&str> {
        match self {
            SignalKind::FileExists { paths } | SignalKind::DirectoryExists { paths } => {
                paths.iter().map(String::as_str).collect()
            }
            SignalKind::FileContains { path, .. } => vec![path.as_str()],
            SignalKind::ManifestDependency { .. } | SignalKind::ExtensionPresent { .. } => {
                Vec::new()
            }
        }
    }
}

/// A weighted signal belonging to one profile
#[derive(Debug, Clone)]
pub struct SignalSpec {
    /// Primary or secondary
    pub class: SignalClass,
    /// Contribution to the raw score when matched
    pub weight: u32,
    /// What to check
    pub kind: SignalKind,
}

/// Registry entry for one capability profile
#[derive(Debug, Clone)]
pub struct ProfilePattern {
    /// Candidate id, also the bundle id
    pub id: CandidateId,
    /// Display name
    pub name: String,
    /// Primary and secondary signals, in evaluation order
    pub signals: Vec<SignalSpec>,
    /// Profiles that legitimately co-occur with this one
    pub related: Vec<CandidateId>,
}

impl ProfilePattern {
    /// Start an entry with no signals
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: CandidateId::new(id),
            name: name.to_string(),
            signals: Vec::new(),
            related: Vec::new(),
        }
    }

    /// Add a weight-heavy signal
    #[must_use]
    pub fn primary(mut self, weight: u32, kind: SignalKind) -> Self {
        self.signals.push(SignalSpec {
            class: SignalClass::Primary,
            weight,
            kind,
        });
        self
    }

    /// Add a weight-light signal
    #[must_use]
    pub fn secondary(mut self, weight: u32, kind: SignalKind) -> Self {
        self.signals.push(SignalSpec {
            class: SignalClass::Secondary,
            weight,
            kind,
        });
        self
    }

    /// Declare a profile that commonly appears alongside this one
    #[must_use]
    pub fn related_to(mut self, id: &str) -> Self {
        self.related.push(CandidateId::new(id));
        self
    }

    /// Maximum attainable raw score
    #[must_use]
    pub fn max_score(&self) -> u64 {
        self.signals.iter().map(|s| u64::from(s.weight)).sum()
    }
}

/// Immutable table of known profiles
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    entries: Vec<ProfilePattern>,
}

impl PatternRegistry {
    /// Build a registry from custom entries
    pub fn new(entries: Vec<ProfilePattern>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();

        for entry in &entries {
            if !seen.insert(entry.id.clone()) {
                return Err(RegistryError::DuplicateId(entry.id.to_string()));
            }
            if entry.max_score() == 0 {
                return Err(RegistryError::NoAttainableScore(entry.id.to_string()));
            }
            for spec in &entry.signals {
                for path in spec.kind.paths() {
                    if !is_workspace_relative(path) {
                        return Err(RegistryError::InvalidPath {
                            candidate: entry.id.to_string(),
                            path: path.to_string(),
                        });
                    }
                }
            }
        }

        Ok(Self { entries })
    }

    /// Registry with the built-in framework profiles
    pub fn builtin() -> Result<Self, RegistryError> {
        use Manifest::{Bundler, Cargo, Npm, Python};
        use SignalKind as K;

        Self::new(vec![
            ProfilePattern::new("react-framework", "React")
                .primary(80, K::dependency(Npm, "react"))
                .secondary(10, K::extension("jsx"))
                .secondary(10, K::dir(&["src/components"])),
            ProfilePattern::new("nextjs-framework", "Next.js")
                .primary(60, K::dependency(Npm, "next"))
                .primary(20, K::file(&["next.config.js", "next.config.mjs", "next.config.ts"]))
                .secondary(10, K::dir(&["pages", "app", "src/app"]))
                .secondary(10, K::dir(&["public"]))
                .related_to("react-framework"),
            ProfilePattern::new("vue-framework", "Vue")
                .primary(70, K::dependency(Npm, "vue"))
                .primary(20, K::extension("vue"))
                .secondary(10, K::file(&["vue.config.js", "vite.config.js", "vite.config.ts"])),
            ProfilePattern::new("angular-framework", "Angular")
                .primary(60, K::dependency(Npm, "@angular/core"))
                .primary(30, K::file(&["angular.json"]))
                .secondary(10, K::dir(&["src/app"])),
            ProfilePattern::new("express-framework", "Express")
                .primary(80, K::dependency(Npm, "express"))
                .secondary(10, K::dir(&["routes", "src/routes"]))
                .secondary(10, K::dir(&["middleware", "src/middleware"])),
            ProfilePattern::new("django-framework", "Django")
                .primary(70, K::dependency(Python, "django"))
                .primary(20, K::file(&["manage.py"]))
                .secondary(10, K::dir(&["templates"])),
            ProfilePattern::new("flask-framework", "Flask")
                .primary(80, K::dependency(Python, "flask"))
                .secondary(10, K::contains("app.py", r"Flask\(__name__")?)
                .secondary(10, K::dir(&["static"])),
            ProfilePattern::new("fastapi-framework", "FastAPI")
                .primary(80, K::dependency(Python, "fastapi"))
                .secondary(20, K::contains("main.py", r"FastAPI\(")?),
            ProfilePattern::new("rails-framework", "Ruby on Rails")
                .primary(70, K::dependency(Bundler, "rails"))
                .primary(20, K::file(&["config/routes.rb"]))
                .secondary(10, K::dir(&["app/controllers"])),
            ProfilePattern::new("rust-axum-service", "Axum service")
                .primary(80, K::dependency(Cargo, "axum"))
                .secondary(10, K::contains("src/main.rs", r"axum::")?)
                .secondary(10, K::dir(&["src/routes", "src/handlers"])),
        ])
    }

    /// All entries, in registration order
    #[must_use]
    pub fn entries(&self) -> &[ProfilePattern] {
        &self.entries
    }

    /// Look up an entry by id
    #[must_use]
    pub fn get(&self, id: &CandidateId) -> Option<&ProfilePattern> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Whether either profile declares the other as related
    #[must_use]
    pub fn are_related(&self, a: &CandidateId, b: &CandidateId) -> bool {
        let declares = |from: &CandidateId, to: &CandidateId| {
            self.get(from).is_some_and(|e| e.related.contains(to))
        };
        declares(a, b) || declares(b, a)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Signal paths must stay inside the workspace
fn is_workspace_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}
