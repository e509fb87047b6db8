//! Read-only access to the bundle store

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors returned by a bundle store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Resolved path lies outside the store root (e.g. through a symlink)
    #[error("path {0:?} resolves outside the bundle store")]
    Escape(PathBuf),

    /// Underlying read failure
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Source of raw bundle bytes
///
/// Implementations never write. `read` returns at most `limit + 1` bytes so
/// oversized content can be detected without reading it whole.
pub trait BundleStore: Send + Sync {
    /// Store root, for diagnostics
    fn root(&self) -> &Path;

    /// Read `relative` (already validated to be a plain relative path)
    fn read(&self, relative: &Path, limit: u64) -> Result<Vec<u8>, StoreError>;
}

/// Bundle store backed by a directory
#[derive(Debug, Clone)]
pub struct FsBundleStore {
    root: PathBuf,
}

impl FsBundleStore {
    /// Store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Personal bundle store: ~/.capload/bundles/
    #[must_use]
    pub fn personal() -> Option<Self> {
        match dirs::home_dir() {
            Some(home) => Some(Self::new(home.join(".capload").join("bundles"))),
            None => {
                warn!("Could not find home directory for personal bundles");
                None
            }
        }
    }
}

impl BundleStore for FsBundleStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, relative: &Path, limit: u64) -> Result<Vec<u8>, StoreError> {
        let root = self.root.canonicalize()?;
        let path = root.join(relative).canonicalize()?;
        if !path.starts_with(&root) {
            return Err(StoreError::Escape(path));
        }

        let file = File::open(&path)?;
        let mut bytes = Vec::new();
        file.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_within_limit() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/summary.md"), "hello").unwrap();

        let store = FsBundleStore::new(dir.path());
        let bytes = store.read(Path::new("a/summary.md"), 100).unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_read_stops_after_limit() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("big.md"), vec![b'x'; 64]).unwrap();

        let store = FsBundleStore::new(dir.path());
        let bytes = store.read(Path::new("big.md"), 10).unwrap();
        assert_eq!(bytes.len(), 11);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = FsBundleStore::new(dir.path());
        match store.read(Path::new("nope/summary.md"), 10) {
            Err(StoreError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.md"), "secret").unwrap();

        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("evil")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.md"),
            dir.path().join("evil/summary.md"),
        )
        .unwrap();

        let store = FsBundleStore::new(dir.path());
        assert!(matches!(
            store.read(Path::new("evil/summary.md"), 100),
            Err(StoreError::Escape(_))
        ));
    }
}
