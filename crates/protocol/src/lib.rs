//! # FileBridge Protocol Library
//!
//! This crate provides the message definitions shared by the FileBridge daemon
//! and its clients.
//!
//! ## Overview
//!
//! Every exchange is a request [`Message`] wrapped in an [`Envelope`], answered
//! by a response `Message` carrying the same sequence number. All paths inside
//! messages are relative to the daemon's root directory.
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{Envelope, Message};
//! use protocol::messages::FileListRequest;
//!
//! let request = Envelope::new(1, Message::FileListRequest(FileListRequest {
//!     path: "src".to_string(),
//! }));
//!
//! let line = request.to_json().unwrap();
//! let decoded = Envelope::from_json(&line).unwrap();
//! assert_eq!(decoded, request);
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Protocol message definitions
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{Envelope, ErrorCode, ErrorMessage, Message, DEFAULT_TREE_DEPTH, PROTOCOL_VERSION};
