//! Path-confined filesystem services.
//!
//! This module provides the file operations exposed by the daemon:
//! - Directory listing, trees, creation and removal
//! - File reads with binary detection, writes, uploads and chunked downloads
//! - Rename, recursive copy and move
//! - Regex search over names and contents
//!
//! # Security
//!
//! Every caller-supplied path is resolved through [`PathGuard`] before any
//! disk access. Paths are normalized lexically and checked component-wise
//! against the canonical root; symlinks that lead outside the root are
//! rejected as well.

use std::fs::Metadata;
use std::time::UNIX_EPOCH;

pub mod browser;
pub mod classify;
pub mod error;
pub mod guard;
pub mod search;
pub mod sniff;
pub mod store;
pub mod transfer;

pub use browser::DirectoryBrowser;
pub use classify::{classify, DEFAULT_LANGUAGE, LANGUAGES};
pub use error::FsError;
pub use guard::PathGuard;
pub use search::{SearchEngine, SearchLimits};
pub use store::FileStore;
pub use transfer::FileTransfer;

/// Default write/upload size limit (10MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default fan-out for concurrent traversals.
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

/// Modification time in seconds since the Unix epoch, or 0 if unavailable.
pub(crate) fn modified_secs(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
