//! # FileBridge Daemon Library
//!
//! This crate provides the daemon (server) functionality for FileBridge,
//! giving clients controlled access to a single directory tree on the host.
//!
//! ## Overview
//!
//! The daemon exposes one root directory and confines every request to it.
//! It provides:
//!
//! - **Browsing**: Directory listings and depth-bounded trees
//! - **File Operations**: Read, write, delete, upload and chunked download
//! - **Transfers**: Rename, recursive copy and move
//! - **Search**: Regex search over file names and contents
//! - **IPC**: A Unix socket server so the CLI can talk to a running daemon
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     IPC Server / CLI                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                      Message Router                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌──────────────┐  │
//! │  │  Browser   │ │   Store    │ │  Transfer  │ │    Search    │  │
//! │  └────────────┘ └────────────┘ └────────────┘ └──────────────┘  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                        PathGuard                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{Config, MessageRouter};
//! use daemon::protocol::messages::{FileListRequest, Message};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let router = MessageRouter::from_config(&config.files)?;
//!
//!     let listing = router
//!         .route(Message::FileListRequest(FileListRequest::default()))
//!         .await?;
//!     println!("{:?}", listing);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Path-confined filesystem services
//! - [`router`]: Message routing to handlers
//! - [`ipc`]: Unix socket server and client

pub mod config;
pub mod files;
pub mod ipc;
pub mod router;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export files types for convenience
pub use files::{
    DirectoryBrowser, FileStore, FileTransfer, FsError, PathGuard, SearchEngine, SearchLimits,
};

// Re-export router types for convenience
pub use router::{MessageRouter, RouterError, RouterResult};

// Re-export IPC types for convenience
pub use ipc::{get_socket_path, IpcClient, IpcError, IpcServer};
