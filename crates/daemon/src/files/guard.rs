//! Root confinement for caller-supplied paths.
//!
//! Every filesystem operation resolves its paths through [`PathGuard`] before
//! touching the disk. Resolution normalizes `.` and `..` lexically and then
//! checks containment component-wise against the canonical root, so an
//! escaping path is rejected without any I/O.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

use super::error::FsError;

/// Resolves root-relative paths and rejects anything outside the root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    /// Canonical absolute root.
    root: PathBuf,
}

impl PathGuard {
    /// Create a guard for the given root directory.
    ///
    /// The root is canonicalized once here; it must exist and be a directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, FsError> {
        let root = root.as_ref();
        let canonical = fs::canonicalize(root)
            .map_err(|e| FsError::from_io(e, root.display().to_string()))?;

        if !canonical.is_dir() {
            return Err(FsError::NotADirectory(root.display().to_string()));
        }

        Ok(Self { root: canonical })
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a caller-supplied path to an absolute path under the root.
    ///
    /// An empty path resolves to the root. A leading `/` is treated as
    /// relative to the root.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, FsError> {
        if raw.contains('\0') {
            return Err(FsError::InvalidArgument(
                "path contains a NUL byte".to_string(),
            ));
        }

        let resolved = self.normalize(raw);
        if !resolved.starts_with(&self.root) {
            warn!(path = %raw, "Rejected path outside root");
            return Err(FsError::AccessDenied(raw.to_string()));
        }

        self.check_existing_ancestor(&resolved, raw)?;
        Ok(resolved)
    }

    /// Like [`resolve`](Self::resolve) but refuses the root itself.
    ///
    /// Used by operations that would remove or relocate their target.
    pub fn resolve_non_root(&self, raw: &str) -> Result<PathBuf, FsError> {
        let resolved = self.resolve(raw)?;
        if resolved == self.root {
            return Err(FsError::InvalidArgument(
                "operation not permitted on the root directory".to_string(),
            ));
        }
        Ok(resolved)
    }

    /// Whether an existing path, with symlinks followed, stays under the root.
    ///
    /// Missing or unreadable paths count as outside.
    pub fn contains(&self, path: &Path) -> bool {
        fs::canonicalize(path)
            .map(|canonical| canonical.starts_with(&self.root))
            .unwrap_or(false)
    }

    /// Root-relative, `/`-separated form of an absolute path under the root.
    ///
    /// Returns an empty string for the root itself.
    pub fn relative(&self, path: &Path) -> String {
        let stripped = path.strip_prefix(&self.root).unwrap_or(path);
        stripped
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Join `raw` onto the root, folding `.` and `..` without touching disk.
    fn normalize(&self, raw: &str) -> PathBuf {
        let mut resolved = self.root.clone();
        for component in Path::new(raw).components() {
            match component {
                Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::Normal(part) => resolved.push(part),
            }
        }
        resolved
    }

    /// Canonicalize the nearest existing ancestor and re-check containment.
    ///
    /// Catches symlinks inside the root that point outside of it.
    fn check_existing_ancestor(&self, path: &Path, raw: &str) -> Result<(), FsError> {
        let mut candidate = Some(path);
        while let Some(current) = candidate {
            match fs::canonicalize(current) {
                Ok(canonical) => {
                    if canonical.starts_with(&self.root) {
                        return Ok(());
                    }
                    warn!(path = %raw, "Rejected path escaping root through a symlink");
                    return Err(FsError::AccessDenied(raw.to_string()));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    candidate = current.parent();
                }
                // Unreadable ancestors surface as errors from the operation itself.
                Err(_) => return Ok(()),
            }
        }
        Ok(())
    }
}
