//! Unix Domain Socket IPC module for CLI-daemon communication.
//!
//! This module provides a local communication channel between the CLI and a
//! running daemon using Unix Domain Sockets.
//!
//! ## Overview
//!
//! The IPC system uses a JSON newline-delimited protocol. Each line is one
//! [`protocol::Envelope`]; the daemon answers every request line with exactly
//! one reply line carrying the same sequence number.
//!
//! ## Socket Path
//!
//! The socket path follows the XDG Base Directory Specification:
//! - Primary: `$XDG_RUNTIME_DIR/filebridge/daemon.sock`
//! - Fallback: `/tmp/filebridge-$UID/daemon.sock`
//!
//! ## Example
//!
//! ### Client (CLI) Side
//!
//! ```rust,no_run
//! use daemon::ipc::{IpcClient, get_socket_path};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let socket_path = get_socket_path();
//!     let mut client = IpcClient::connect(&socket_path).await?;
//!
//!     if client.ping().await? {
//!         println!("Daemon is running");
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod server;

pub use client::IpcClient;
pub use server::{IpcConnection, IpcError, IpcServer, MAX_LINE_LENGTH};

use std::path::PathBuf;

/// Get the socket path for IPC communication.
///
/// ## Path Resolution
///
/// 1. If `$XDG_RUNTIME_DIR` is set: `$XDG_RUNTIME_DIR/filebridge/daemon.sock`
/// 2. Otherwise: `/tmp/filebridge-$UID/daemon.sock`
#[cfg(unix)]
pub fn get_socket_path() -> PathBuf {
    use std::os::unix::fs::MetadataExt;

    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(runtime_dir) if !runtime_dir.is_empty() => PathBuf::from(runtime_dir)
            .join("filebridge")
            .join("daemon.sock"),
        _ => {
            // Get UID by checking metadata of a file we own
            let uid = std::fs::metadata("/proc/self")
                .map(|m| m.uid())
                .unwrap_or(0);

            PathBuf::from(format!("/tmp/filebridge-{}", uid)).join("daemon.sock")
        }
    }
}

/// Non-Unix platforms are not supported for Unix Domain Sockets.
#[cfg(not(unix))]
pub fn get_socket_path() -> PathBuf {
    PathBuf::from("/tmp/filebridge-unsupported/daemon.sock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn with_runtime_dir<F: FnOnce()>(value: Option<&str>, f: F) {
        let original = std::env::var("XDG_RUNTIME_DIR").ok();
        match value {
            Some(v) => std::env::set_var("XDG_RUNTIME_DIR", v),
            None => std::env::remove_var("XDG_RUNTIME_DIR"),
        }

        f();

        match original {
            Some(v) => std::env::set_var("XDG_RUNTIME_DIR", v),
            None => std::env::remove_var("XDG_RUNTIME_DIR"),
        }
    }

    #[test]
    #[serial]
    fn test_get_socket_path_with_xdg_runtime_dir() {
        with_runtime_dir(Some("/run/user/1000"), || {
            assert_eq!(
                get_socket_path(),
                PathBuf::from("/run/user/1000/filebridge/daemon.sock")
            );
        });
    }

    #[test]
    #[serial]
    fn test_get_socket_path_without_xdg_runtime_dir() {
        with_runtime_dir(None, || {
            let path = get_socket_path();
            let path = path.to_str().unwrap();
            assert!(path.starts_with("/tmp/filebridge-"));
            assert!(path.ends_with("/daemon.sock"));
        });
    }

    #[test]
    #[serial]
    fn test_socket_path_is_absolute_sock() {
        let path = get_socket_path();
        assert!(path.is_absolute());
        assert!(path.extension().map(|e| e == "sock").unwrap_or(false));
    }
}
