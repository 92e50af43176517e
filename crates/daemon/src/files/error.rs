//! Error taxonomy shared by every filesystem operation.

use std::io;

use thiserror::Error;

/// Errors returned by the path-confined filesystem services.
///
/// Paths carried by the variants are always root-relative so error messages
/// never disclose where the root lives on the host.
#[derive(Debug, Error)]
pub enum FsError {
    /// The path resolves outside the root directory.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The path does not exist.
    #[error("path not found: {0}")]
    NotFound(String),

    /// A directory was required.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A file was required.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// The target already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The directory still has children.
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// A parameter is missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unexpected I/O failure.
    #[error("I/O error on {path}: {source}")]
    Internal {
        /// Path the operation was working on.
        path: String,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Map an I/O error onto the taxonomy.
    pub fn from_io(err: io::Error, path: impl Into<String>) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path),
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path),
            io::ErrorKind::DirectoryNotEmpty => FsError::NotEmpty(path),
            io::ErrorKind::NotADirectory => FsError::NotADirectory(path),
            io::ErrorKind::IsADirectory => FsError::IsADirectory(path),
            _ => FsError::Internal { path, source: err },
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FsError::Internal { .. })
    }
}
