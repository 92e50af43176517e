//! Message router for dispatching incoming requests to the file services.
//!
//! This module provides the `MessageRouter` struct that receives protocol
//! messages and routes them to the directory browser, file store, transfer
//! service or search engine based on message type. Every request produces
//! exactly one response message; failures become [`Message::Error`].

use std::sync::Arc;

use protocol::messages::{
    Ack, Capabilities, CopyRequest, DirectoryCreateRequest, DirectoryDeleteRequest, ErrorCode,
    ErrorMessage, FileDeleteRequest, FileDownloadRequest, FileListRequest, FileReadRequest,
    FileUploadRequest, FileUploadResponse, FileWriteRequest, Message, MoveRequest, Ping, Pong,
    RenameRequest, SearchRequest, TreeRequest,
};
use protocol::{Envelope, ProtocolError, DEFAULT_TREE_DEPTH};
use tracing::{debug, error};

use crate::config::FileConfig;
use crate::files::{
    DirectoryBrowser, FileStore, FileTransfer, FsError, PathGuard, SearchEngine, SearchLimits,
    LANGUAGES,
};

/// Result type for router operations.
pub type RouterResult = Result<Message, RouterError>;

/// Errors that can occur during message routing.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// File operation error.
    #[error(transparent)]
    File(#[from] FsError),

    /// Missing parameter or a message that is not a request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Envelope could not be accepted.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl RouterError {
    /// Convert the error to a protocol ErrorMessage.
    pub fn to_error_message(&self, context: Option<String>) -> ErrorMessage {
        let code = match self {
            RouterError::File(e) => match e {
                FsError::AccessDenied(_) => ErrorCode::PermissionDenied,
                FsError::NotFound(_) => ErrorCode::NotFound,
                FsError::NotADirectory(_) => ErrorCode::NotADirectory,
                FsError::IsADirectory(_) => ErrorCode::IsADirectory,
                FsError::AlreadyExists(_) => ErrorCode::AlreadyExists,
                FsError::NotEmpty(_) => ErrorCode::NotEmpty,
                FsError::InvalidArgument(_) => ErrorCode::InvalidRequest,
                FsError::Internal { .. } => ErrorCode::InternalError,
            },
            RouterError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            RouterError::Protocol(ProtocolError::VersionMismatch { .. }) => {
                ErrorCode::VersionMismatch
            }
            RouterError::Protocol(_) => ErrorCode::InvalidRequest,
        };

        let recoverable = matches!(self, RouterError::File(e) if e.is_recoverable());

        ErrorMessage {
            code,
            message: self.to_string(),
            context,
            recoverable,
        }
    }
}

/// Message router that dispatches requests to the file services.
///
/// All services share one [`PathGuard`], so every path in every request is
/// confined to the same root.
pub struct MessageRouter {
    /// Listing, trees and directory creation/removal.
    browser: Arc<DirectoryBrowser>,
    /// Reads, writes, uploads and downloads.
    store: Arc<FileStore>,
    /// Rename, copy and move.
    transfer: Arc<FileTransfer>,
    /// Name and content search.
    search: Arc<SearchEngine>,
    /// Tree depth used when a request leaves it unset.
    default_tree_depth: u32,
    /// Upper bound on requested tree depth.
    max_tree_depth: u32,
}

impl MessageRouter {
    /// Create a new message router with the given services.
    pub fn new(
        browser: Arc<DirectoryBrowser>,
        store: Arc<FileStore>,
        transfer: Arc<FileTransfer>,
        search: Arc<SearchEngine>,
    ) -> Self {
        Self {
            browser,
            store,
            transfer,
            search,
            default_tree_depth: DEFAULT_TREE_DEPTH,
            max_tree_depth: 16,
        }
    }

    /// Set the default and maximum depth for tree requests.
    pub fn with_tree_depth(mut self, default_depth: u32, max_depth: u32) -> Self {
        self.default_tree_depth = default_depth;
        self.max_tree_depth = max_depth;
        self
    }

    /// Build every service from the `[files]` configuration section.
    pub fn from_config(config: &FileConfig) -> Result<Self, FsError> {
        let guard = Arc::new(PathGuard::new(&config.root)?);

        let browser = DirectoryBrowser::new(Arc::clone(&guard))
            .with_max_concurrency(config.max_concurrency);
        let store = FileStore::new(Arc::clone(&guard)).with_max_file_size(config.max_file_size);
        let transfer =
            FileTransfer::new(Arc::clone(&guard)).with_max_concurrency(config.max_concurrency);
        let search = SearchEngine::new(guard).with_limits(SearchLimits {
            max_results: config.max_results,
            max_matches_per_file: config.max_matches_per_file,
            max_concurrency: config.max_concurrency,
            max_file_size: config.max_file_size,
        });

        Ok(Self::new(
            Arc::new(browser),
            Arc::new(store),
            Arc::new(transfer),
            Arc::new(search),
        )
        .with_tree_depth(config.default_tree_depth, config.max_tree_depth))
    }

    /// Handle one envelope and produce the reply envelope.
    ///
    /// The reply carries the request's sequence number.
    pub async fn handle(&self, envelope: Envelope) -> Envelope {
        if let Err(e) = envelope.check_version() {
            let err = RouterError::from(e);
            return envelope.reply(Message::Error(err.to_error_message(None)));
        }

        let Envelope {
            sequence, payload, ..
        } = envelope;
        let kind = payload.kind();

        let response = match self.route(payload).await {
            Ok(message) => message,
            Err(e) => {
                match &e {
                    RouterError::File(FsError::Internal { .. }) => {
                        error!(kind, error = %e, "Request failed")
                    }
                    _ => debug!(kind, error = %e, "Request rejected"),
                }
                Message::Error(e.to_error_message(Some(kind.to_string())))
            }
        };

        Envelope::new(sequence, response)
    }

    /// Route a message to the appropriate handler.
    pub async fn route(&self, message: Message) -> RouterResult {
        debug!(kind = message.kind(), "Routing message");

        match message {
            // Directory messages
            Message::FileListRequest(req) => self.handle_list(req).await,
            Message::DirectoryCreateRequest(req) => self.handle_create_directory(req).await,
            Message::DirectoryDeleteRequest(req) => self.handle_delete_directory(req).await,
            Message::TreeRequest(req) => self.handle_tree(req).await,

            // File messages
            Message::FileReadRequest(req) => self.handle_read(req).await,
            Message::FileWriteRequest(req) => self.handle_write(req).await,
            Message::FileDeleteRequest(req) => self.handle_delete_file(req).await,
            Message::FileUploadRequest(req) => self.handle_upload(req).await,
            Message::FileDownloadRequest(req) => self.handle_download(req).await,

            // Transfer messages
            Message::RenameRequest(req) => self.handle_rename(req).await,
            Message::CopyRequest(req) => self.handle_copy(req).await,
            Message::MoveRequest(req) => self.handle_move(req).await,

            // Search messages
            Message::SearchRequest(req) => self.handle_search(req).await,

            // Control messages
            Message::Ping(ping) => self.handle_ping(ping),
            Message::CapabilitiesRequest => Ok(Message::Capabilities(self.capabilities())),

            // Everything else is a response and cannot be handled
            other => Err(RouterError::InvalidRequest(format!(
                "{} is not a request",
                other.kind()
            ))),
        }
    }

    /// Describe the operations and limits this router serves.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            languages: LANGUAGES.iter().map(|s| s.to_string()).collect(),
            max_file_size: self.store.max_file_size(),
            max_search_results: self.search.limits().max_results,
            ..Capabilities::default()
        }
    }

    // =========================================================================
    // Directory Handlers
    // =========================================================================

    async fn handle_list(&self, req: FileListRequest) -> RouterResult {
        let listing = self.browser.list(&req.path).await?;
        Ok(Message::FileListResponse(listing))
    }

    async fn handle_create_directory(&self, req: DirectoryCreateRequest) -> RouterResult {
        require("path", &req.path)?;
        self.browser
            .create_directory(&req.path, req.recursive)
            .await?;
        Ok(ack("Directory created", req.path))
    }

    async fn handle_delete_directory(&self, req: DirectoryDeleteRequest) -> RouterResult {
        require("path", &req.path)?;
        self.browser
            .delete_directory(&req.path, req.recursive)
            .await?;
        Ok(ack("Directory deleted", req.path))
    }

    async fn handle_tree(&self, req: TreeRequest) -> RouterResult {
        let depth = match req.max_depth {
            None | Some(0) => self.default_tree_depth,
            Some(depth) => depth,
        }
        .min(self.max_tree_depth);

        let tree = self.browser.build_tree(&req.path, depth).await?;
        Ok(Message::TreeResponse(tree))
    }

    // =========================================================================
    // File Handlers
    // =========================================================================

    async fn handle_read(&self, req: FileReadRequest) -> RouterResult {
        require("path", &req.path)?;
        let record = self.store.read(&req.path).await?;
        Ok(Message::FileReadResponse(record))
    }

    async fn handle_write(&self, req: FileWriteRequest) -> RouterResult {
        require("path", &req.path)?;
        let written = self
            .store
            .write(&req.path, &req.content, req.create_directories)
            .await?;
        Ok(Message::FileWriteResponse(written))
    }

    async fn handle_delete_file(&self, req: FileDeleteRequest) -> RouterResult {
        require("path", &req.path)?;
        self.store.delete(&req.path).await?;
        Ok(ack("File deleted", req.path))
    }

    async fn handle_upload(&self, req: FileUploadRequest) -> RouterResult {
        if req.files.is_empty() {
            return Err(RouterError::InvalidRequest("no files uploaded".to_string()));
        }
        let files = self.store.upload(&req.path, req.files).await?;
        Ok(Message::FileUploadResponse(FileUploadResponse { files }))
    }

    async fn handle_download(&self, req: FileDownloadRequest) -> RouterResult {
        require("path", &req.path)?;
        let chunk = self
            .store
            .download_chunk(&req.path, req.offset, req.chunk_size)
            .await?;
        Ok(Message::FileDownloadChunk(chunk))
    }

    // =========================================================================
    // Transfer Handlers
    // =========================================================================

    async fn handle_rename(&self, req: RenameRequest) -> RouterResult {
        require("old_path", &req.old_path)?;
        require("new_name", &req.new_name)?;
        let renamed = self.transfer.rename(&req.old_path, &req.new_name).await?;
        Ok(Message::RenameResponse(renamed))
    }

    async fn handle_copy(&self, req: CopyRequest) -> RouterResult {
        require("source_path", &req.source_path)?;
        require("destination_path", &req.destination_path)?;
        self.transfer
            .copy(&req.source_path, &req.destination_path)
            .await?;
        Ok(ack("Copied successfully", req.destination_path))
    }

    async fn handle_move(&self, req: MoveRequest) -> RouterResult {
        require("source_path", &req.source_path)?;
        require("destination_path", &req.destination_path)?;
        self.transfer
            .move_path(&req.source_path, &req.destination_path)
            .await?;
        Ok(ack("Moved successfully", req.destination_path))
    }

    // =========================================================================
    // Search and Control Handlers
    // =========================================================================

    async fn handle_search(&self, req: SearchRequest) -> RouterResult {
        require("query", &req.query)?;
        let results = self.search.search(&req).await?;
        Ok(Message::SearchResponse(results))
    }

    fn handle_ping(&self, ping: Ping) -> RouterResult {
        debug!(timestamp = ping.timestamp, "Received ping");
        Ok(Message::Pong(Pong {
            timestamp: ping.timestamp,
        }))
    }
}

/// Reject a missing or empty string parameter.
fn require(name: &str, value: &str) -> Result<(), RouterError> {
    if value.is_empty() {
        return Err(RouterError::InvalidRequest(format!("{} is required", name)));
    }
    Ok(())
}

fn ack(message: &str, path: String) -> Message {
    Message::Ack(Ack {
        message: message.to_string(),
        path,
    })
}
