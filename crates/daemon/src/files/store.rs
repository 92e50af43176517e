//! Single-file operations: read, write, delete, upload and chunked download.
//!
//! Uploads are written to a temporary sibling and atomically renamed into
//! place, so a reader never observes a half-written file.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use protocol::messages::{
    FileDownloadChunk, FileRecord, FileWriteResponse, UploadItem, UploadedFile,
};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use super::classify::classify;
use super::error::FsError;
use super::guard::PathGuard;
use super::sniff::is_binary;
use super::{modified_secs, DEFAULT_MAX_FILE_SIZE};

/// Default chunk size for downloads (64KB).
pub const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024;

/// Maximum chunk size (1MB).
pub const MAX_CHUNK_SIZE: u32 = 1024 * 1024;

/// File reads and writes confined to the guard's root.
pub struct FileStore {
    guard: Arc<PathGuard>,
    /// Largest payload accepted by `write` and `upload`, in bytes.
    max_file_size: u64,
}

impl FileStore {
    /// Create a file store with the default size limit.
    pub fn new(guard: Arc<PathGuard>) -> Self {
        Self {
            guard,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Set the size limit for writes and uploads.
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// The configured size limit.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Read a file's metadata and, for text files, its content.
    ///
    /// Binary files are reported with `is_binary` set and no content; they
    /// are never decoded. Invalid UTF-8 in text files is replaced lossily.
    pub async fn read(&self, path: &str) -> Result<FileRecord, FsError> {
        let file_path = self.guard.resolve(path)?;

        let metadata = fs::metadata(&file_path)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        if metadata.is_dir() {
            return Err(FsError::IsADirectory(path.to_string()));
        }

        let name = file_name(&file_path);
        let binary = is_binary(&file_path).await;

        let content = if binary {
            None
        } else {
            let bytes = fs::read(&file_path)
                .await
                .map_err(|e| FsError::from_io(e, path))?;
            Some(match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            })
        };

        debug!(path = %path, size = metadata.len(), binary, "Read file");

        Ok(FileRecord {
            path: self.guard.relative(&file_path),
            language: classify(&name).to_string(),
            name,
            size: metadata.len(),
            modified: modified_secs(&metadata),
            is_binary: binary,
            content,
        })
    }

    /// Create or overwrite a file with UTF-8 content.
    ///
    /// Missing parent directories are created only when `create_directories`
    /// is set; otherwise a missing parent is `NotFound`.
    pub async fn write(
        &self,
        path: &str,
        content: &str,
        create_directories: bool,
    ) -> Result<FileWriteResponse, FsError> {
        let file_path = self.guard.resolve(path)?;
        self.check_size(content.len() as u64, path)?;

        if let Ok(metadata) = fs::metadata(&file_path).await {
            if metadata.is_dir() {
                return Err(FsError::IsADirectory(path.to_string()));
            }
        }

        if create_directories {
            if let Some(parent) = file_path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| FsError::from_io(e, path))?;
            }
        }

        fs::write(&file_path, content.as_bytes())
            .await
            .map_err(|e| FsError::from_io(e, path))?;

        let metadata = fs::metadata(&file_path)
            .await
            .map_err(|e| FsError::from_io(e, path))?;

        debug!(path = %path, size = metadata.len(), "Wrote file");

        Ok(FileWriteResponse {
            path: self.guard.relative(&file_path),
            size: metadata.len(),
            modified: modified_secs(&metadata),
        })
    }

    /// Delete a single file.
    pub async fn delete(&self, path: &str) -> Result<(), FsError> {
        let file_path = self.guard.resolve_non_root(path)?;

        let metadata = fs::symlink_metadata(&file_path)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        if metadata.is_dir() {
            return Err(FsError::IsADirectory(path.to_string()));
        }

        fs::remove_file(&file_path)
            .await
            .map_err(|e| FsError::from_io(e, path))?;

        debug!(path = %path, "Deleted file");
        Ok(())
    }

    /// Store uploaded files in a directory.
    ///
    /// Items are processed in order. An item that fails validation stops the
    /// upload; items stored before it remain in place.
    pub async fn upload(
        &self,
        directory: &str,
        items: Vec<UploadItem>,
    ) -> Result<Vec<UploadedFile>, FsError> {
        let dir = self.guard.resolve(directory)?;
        let metadata = fs::metadata(&dir)
            .await
            .map_err(|e| FsError::from_io(e, directory))?;
        if !metadata.is_dir() {
            return Err(FsError::NotADirectory(directory.to_string()));
        }

        let dir_rel = self.guard.relative(&dir);
        let mut uploaded = Vec::with_capacity(items.len());

        for item in items {
            validate_segment(&item.name)?;
            self.check_size(item.data.len() as u64, &item.name)?;

            if let Some(expected) = &item.checksum {
                let actual = Sha256::digest(&item.data);
                if actual.as_slice() != expected.as_slice() {
                    return Err(FsError::InvalidArgument(format!(
                        "checksum mismatch for {}: expected {}, got {}",
                        item.name,
                        hex::encode(expected),
                        hex::encode(actual)
                    )));
                }
            }

            let target_rel = join_relative(&dir_rel, &item.name);
            let target = self.guard.resolve(&target_rel)?;
            // Fixed-length name so long uploads never exceed NAME_MAX.
            let temp_path = dir.join(format!(".upload-{:016x}.tmp", rand::random::<u64>()));

            let stored = match fs::write(&temp_path, &item.data).await {
                Ok(()) => fs::rename(&temp_path, &target).await,
                Err(e) => Err(e),
            };

            if let Err(e) = stored {
                if let Err(cleanup) = fs::remove_file(&temp_path).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = ?temp_path, error = %cleanup, "Failed to cleanup temp file");
                    }
                }
                return Err(FsError::from_io(e, target_rel));
            }

            debug!(path = %target_rel, size = item.data.len(), "Stored upload");

            uploaded.push(UploadedFile {
                original_name: item.name,
                path: target_rel,
                size: item.data.len() as u64,
            });
        }

        Ok(uploaded)
    }

    /// Read one chunk of a file starting at `offset`.
    ///
    /// A `chunk_size` of zero uses [`DEFAULT_CHUNK_SIZE`]; larger requests are
    /// clamped to [`MAX_CHUNK_SIZE`]. An offset equal to the file size yields
    /// an empty final chunk.
    pub async fn download_chunk(
        &self,
        path: &str,
        offset: u64,
        chunk_size: u32,
    ) -> Result<FileDownloadChunk, FsError> {
        let file_path = self.guard.resolve(path)?;

        let metadata = fs::metadata(&file_path)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        if metadata.is_dir() {
            return Err(FsError::IsADirectory(path.to_string()));
        }

        let total_size = metadata.len();
        if offset > total_size {
            return Err(FsError::InvalidArgument(format!(
                "offset {} is beyond the end of {} ({} bytes)",
                offset, path, total_size
            )));
        }

        let chunk_size = match chunk_size {
            0 => DEFAULT_CHUNK_SIZE,
            n => n.min(MAX_CHUNK_SIZE),
        };

        let mut file = File::open(&file_path)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| FsError::from_io(e, path))?;

        let mut data = Vec::with_capacity((chunk_size as u64).min(total_size - offset) as usize);
        file.take(chunk_size as u64)
            .read_to_end(&mut data)
            .await
            .map_err(|e| FsError::from_io(e, path))?;

        let is_last = offset + data.len() as u64 >= total_size;

        Ok(FileDownloadChunk {
            path: self.guard.relative(&file_path),
            offset,
            total_size,
            data,
            is_last,
        })
    }

    fn check_size(&self, size: u64, path: &str) -> Result<(), FsError> {
        if size > self.max_file_size {
            return Err(FsError::InvalidArgument(format!(
                "{}: {} bytes exceeds limit of {} bytes",
                path, size, self.max_file_size
            )));
        }
        Ok(())
    }
}

/// Reject anything that is not a single, plain path segment.
pub(crate) fn validate_segment(name: &str) -> Result<(), FsError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(|c| matches!(c, '/' | '\\' | '\0'))
    {
        return Err(FsError::InvalidArgument(format!(
            "invalid file name: {:?}",
            name
        )));
    }
    Ok(())
}

/// Join a name onto a root-relative directory path.
pub(crate) fn join_relative(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
