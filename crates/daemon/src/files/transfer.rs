//! Rename, copy and move within the root.
//!
//! Copies are recursive and not transactional: when a copy fails part-way,
//! whatever was already written stays on disk. Moves rely on `rename(2)` and
//! are only atomic within a single filesystem.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::{stream, FutureExt, TryStreamExt};
use protocol::messages::RenameResponse;
use tokio::fs;
use tracing::debug;

use super::browser::read_children;
use super::error::FsError;
use super::guard::PathGuard;
use super::store::{join_relative, validate_segment};
use super::DEFAULT_MAX_CONCURRENCY;

/// Rename, copy and move operations.
pub struct FileTransfer {
    guard: Arc<PathGuard>,
    /// Maximum number of directory children copied at once.
    max_concurrency: usize,
}

impl FileTransfer {
    /// Create a new transfer service.
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self {
            guard,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Set how many entries may be copied concurrently.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Give an entry a new name within its directory.
    ///
    /// An existing entry with the new name is replaced, following `rename(2)`.
    pub async fn rename(&self, old_path: &str, new_name: &str) -> Result<RenameResponse, FsError> {
        let source = self.guard.resolve_non_root(old_path)?;
        validate_segment(new_name)?;

        fs::symlink_metadata(&source)
            .await
            .map_err(|e| FsError::from_io(e, old_path))?;

        let parent = source.parent().unwrap_or(self.guard.root());
        let new_path = join_relative(&self.guard.relative(parent), new_name);
        let target = self.guard.resolve(&new_path)?;

        fs::rename(&source, &target)
            .await
            .map_err(|e| FsError::from_io(e, old_path))?;

        debug!(from = %old_path, to = %new_path, "Renamed entry");

        Ok(RenameResponse {
            old_path: self.guard.relative(&source),
            new_path,
        })
    }

    /// Recursively copy a file or directory.
    ///
    /// Directory children are copied concurrently. Symlinks are recreated
    /// rather than followed.
    pub async fn copy(&self, source_path: &str, destination_path: &str) -> Result<(), FsError> {
        let source = self.guard.resolve(source_path)?;
        let destination = self.guard.resolve_non_root(destination_path)?;

        fs::symlink_metadata(&source)
            .await
            .map_err(|e| FsError::from_io(e, source_path))?;
        check_not_nested(&source, &destination, destination_path)?;

        self.copy_recursive(source, destination).await?;

        debug!(from = %source_path, to = %destination_path, "Copied entry");
        Ok(())
    }

    /// Move a file or directory with a single rename.
    ///
    /// Moving across filesystems is not supported and fails with `Internal`.
    pub async fn move_path(&self, source_path: &str, destination_path: &str) -> Result<(), FsError> {
        let source = self.guard.resolve_non_root(source_path)?;
        let destination = self.guard.resolve_non_root(destination_path)?;

        fs::symlink_metadata(&source)
            .await
            .map_err(|e| FsError::from_io(e, source_path))?;
        check_not_nested(&source, &destination, destination_path)?;

        fs::rename(&source, &destination)
            .await
            .map_err(|e| FsError::from_io(e, destination_path))?;

        debug!(from = %source_path, to = %destination_path, "Moved entry");
        Ok(())
    }

    fn copy_recursive(
        &self,
        source: PathBuf,
        destination: PathBuf,
    ) -> BoxFuture<'_, Result<(), FsError>> {
        async move {
            let io_err =
                |e: std::io::Error, path: &Path| FsError::from_io(e, self.guard.relative(path));

            let metadata = fs::symlink_metadata(&source)
                .await
                .map_err(|e| io_err(e, &source))?;

            if metadata.is_dir() {
                fs::create_dir_all(&destination)
                    .await
                    .map_err(|e| io_err(e, &destination))?;

                let children = read_children(&source)
                    .await
                    .map_err(|e| io_err(e, &source))?;

                stream::iter(children.into_iter().map(Ok::<_, FsError>))
                    .try_for_each_concurrent(self.max_concurrency, |child| {
                        let target = destination.join(&child.name);
                        self.copy_recursive(child.path, target)
                    })
                    .await
            } else if metadata.file_type().is_symlink() {
                let link = fs::read_link(&source)
                    .await
                    .map_err(|e| io_err(e, &source))?;
                fs::symlink(&link, &destination)
                    .await
                    .map_err(|e| io_err(e, &destination))
            } else {
                fs::copy(&source, &destination)
                    .await
                    .map(|_| ())
                    .map_err(|e| io_err(e, &destination))
            }
        }
        .boxed()
    }
}

/// Refuse a destination equal to or inside the source.
fn check_not_nested(source: &Path, destination: &Path, raw: &str) -> Result<(), FsError> {
    if destination.starts_with(source) {
        return Err(FsError::InvalidArgument(format!(
            "destination {} is inside the source",
            raw
        )));
    }
    Ok(())
}
