//! Read-only view of a workspace for the duration of one detection run
//!
//! Manifests are parsed once per run and file contents are memoized, so every
//! signal sees the same filesystem state. Nothing here writes or executes.

use crate::registry::Manifest;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directories never descended into by the extension scan
const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "target",
    "vendor",
    "venv",
    ".venv",
    "__pycache__",
    "dist",
    "build",
];

/// Upper bound on directory entries visited by the extension scan
const MAX_SCAN_ENTRIES: usize = 10_000;

/// Files larger than this are never read for pattern signals
const MAX_INSPECTED_FILE_BYTES: u64 = 1024 * 1024;

/// Dependencies declared by one manifest file
#[derive(Debug, Clone, Default)]
pub struct ManifestDeps {
    /// File the dependencies were read from
    pub file: String,
    /// Normalized (lowercase) dependency names
    pub names: BTreeSet<String>,
}

/// Workspace state captured for a single detection run
pub struct WorkspaceSnapshot {
    root: PathBuf,
    manifests: HashMap<Manifest, Vec<ManifestDeps>>,
    extensions: BTreeSet<String>,
    contents: RefCell<HashMap<String, Option<String>>>,
}

impl WorkspaceSnapshot {
    /// Capture manifests and the extension index under `root`
    pub fn capture(root: &Path, max_depth: usize) -> Self {
        let mut manifests = HashMap::new();
        for manifest in Manifest::ALL {
            let found: Vec<ManifestDeps> = manifest
                .file_names()
                .iter()
                .filter_map(|name| read_manifest(root, name))
                .collect();
            if !found.is_empty() {
                manifests.insert(manifest, found);
            }
        }

        let mut extensions = BTreeSet::new();
        let mut visited = 0;
        scan_extensions(root, 0, max_depth, &mut extensions, &mut visited);

        Self {
            root: root.to_path_buf(),
            manifests,
            extensions,
            contents: RefCell::new(HashMap::new()),
        }
    }

    /// First manifest file of the ecosystem that declares `name`
    pub fn dependency_source(&self, manifest: Manifest, name: &str) -> Option<&str> {
        self.manifests
            .get(&manifest)?
            .iter()
            .find(|deps| deps.names.contains(name))
            .map(|deps| deps.file.as_str())
    }

    /// Whether `relative` is an existing regular file
    pub fn is_file(&self, relative: &str) -> bool {
        self.root.join(relative).is_file()
    }

    /// Whether `relative` is an existing directory
    pub fn is_dir(&self, relative: &str) -> bool {
        self.root.join(relative).is_dir()
    }

    /// Whether any scanned file has the extension
    pub fn has_extension(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }

    /// Text content of `relative`, read at most once per snapshot
    pub fn content(&self, relative: &str) -> Option<String> {
        if let Some(cached) = self.contents.borrow().get(relative) {
            return cached.clone();
        }
        let content = read_small_text(&self.root.join(relative));
        self.contents
            .borrow_mut()
            .insert(relative.to_string(), content.clone());
        content
    }
}

fn read_small_text(path: &Path) -> Option<String> {
    let meta = fs::metadata(path).ok()?;
    if !meta.is_file() || meta.len() > MAX_INSPECTED_FILE_BYTES {
        return None;
    }
    fs::read_to_string(path).ok()
}

fn read_manifest(root: &Path, file_name: &str) -> Option<ManifestDeps> {
    let content = read_small_text(&root.join(file_name))?;

    let names = match file_name {
        "package.json" => json_keys(
            &content,
            &[
                "dependencies",
                "devDependencies",
                "peerDependencies",
                "optionalDependencies",
            ],
        ),
        "composer.json" => json_keys(&content, &["require", "require-dev"]),
        "requirements.txt" => Some(requirements_names(&content)),
        "pyproject.toml" => pyproject_names(&content),
        "Cargo.toml" => cargo_names(&content),
        "Gemfile" => Some(gemfile_names(&content)),
        _ => None,
    };

    match names {
        Some(names) => Some(ManifestDeps {
            file: file_name.to_string(),
            names,
        }),
        None => {
            debug!("Ignoring unparsable manifest {}", file_name);
            None
        }
    }
}

fn json_keys(content: &str, sections: &[&str]) -> Option<BTreeSet<String>> {
    let value: serde_json::Value = serde_json::from_str(content).ok()?;
    let mut names = BTreeSet::new();
    for section in sections {
        if let Some(map) = value.get(section).and_then(serde_json::Value::as_object) {
            names.extend(map.keys().map(|k| k.to_ascii_lowercase()));
        }
    }
    Some(names)
}

/// Extract the distribution name from a PEP 508 requirement string
fn requirement_name(line: &str) -> Option<String> {
    let line = line.split('#').next()?.trim();
    if line.is_empty() || line.starts_with('-') {
        return None;
    }
    let end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(line.len());
    let name = &line[..end];
    (!name.is_empty()).then(|| name.to_ascii_lowercase().replace('_', "-"))
}

fn requirements_names(content: &str) -> BTreeSet<String> {
    content.lines().filter_map(requirement_name).collect()
}

fn toml_table_keys(table: &toml::Table, path: &[&str]) -> Vec<String> {
    let Some((first, rest)) = path.split_first() else {
        return Vec::new();
    };
    let Some(mut current) = table.get(*first) else {
        return Vec::new();
    };
    for key in rest {
        match current.get(*key) {
            Some(next) => current = next,
            None => return Vec::new(),
        }
    }
    current
        .as_table()
        .map(|t| t.keys().map(|k| k.to_ascii_lowercase()).collect())
        .unwrap_or_default()
}

fn pyproject_names(content: &str) -> Option<BTreeSet<String>> {
    let value: toml::Table = toml::from_str(content).ok()?;
    let mut names = BTreeSet::new();

    if let Some(deps) = value
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(toml::Value::as_array)
    {
        names.extend(
            deps.iter()
                .filter_map(toml::Value::as_str)
                .filter_map(requirement_name),
        );
    }
    if let Some(optional) = value
        .get("project")
        .and_then(|p| p.get("optional-dependencies"))
        .and_then(toml::Value::as_table)
    {
        for group in optional.values().filter_map(toml::Value::as_array) {
            names.extend(
                group
                    .iter()
                    .filter_map(toml::Value::as_str)
                    .filter_map(requirement_name),
            );
        }
    }
    names.extend(
        toml_table_keys(&value, &["tool", "poetry", "dependencies"])
            .into_iter()
            .map(|n| n.replace('_', "-")),
    );

    Some(names)
}

fn cargo_names(content: &str) -> Option<BTreeSet<String>> {
    let value: toml::Table = toml::from_str(content).ok()?;
    let mut names = BTreeSet::new();
    let sections: [&[&str]; 3] = [
        &["dependencies"],
        &["dev-dependencies"],
        &["workspace", "dependencies"],
    ];
    for path in sections {
        names.extend(toml_table_keys(&value, path));
    }
    Some(names)
}

fn gemfile_names(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .filter_map(|line| {
            let rest = line.trim_start().strip_prefix("gem")?;
            let rest = rest.trim_start();
            let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
            let inner = &rest[1..];
            let end = inner.find(quote)?;
            Some(inner[..end].to_ascii_lowercase())
        })
        .collect()
}

fn scan_extensions(
    dir: &Path,
    depth: usize,
    max_depth: usize,
    out: &mut BTreeSet<String>,
    visited: &mut usize,
) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    // Sorted for deterministic truncation at MAX_SCAN_ENTRIES
    let mut entries: Vec<_> = entries.filter_map(std::result::Result::ok).collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        if *visited >= MAX_SCAN_ENTRIES {
            return;
        }
        *visited += 1;

        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();

        if file_type.is_dir() {
            let name = entry.file_name();
            let skip = name.to_str().map_or(true, |n| IGNORED_DIRS.contains(&n));
            if !skip && depth < max_depth {
                scan_extensions(&path, depth + 1, max_depth, out, visited);
            }
        } else if file_type.is_file() {
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                out.insert(ext.to_ascii_lowercase());
            }
        }
    }
}
