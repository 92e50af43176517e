//! Protocol message definitions for FileBridge.
//!
//! This module defines every request and response exchanged between the daemon
//! and its clients. All paths carried by these messages are relative to the
//! daemon's root directory; an empty path names the root itself.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Default depth for tree listings when the client does not specify one.
pub const DEFAULT_TREE_DEPTH: u32 = 3;

/// Envelope wrapper for all protocol messages.
///
/// The envelope provides versioning and sequence numbers so responses can be
/// matched to the request that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version for compatibility checking.
    pub version: u8,
    /// Sequence number; responses echo the sequence of their request.
    pub sequence: u64,
    /// The actual message payload.
    pub payload: Message,
}

impl Envelope {
    /// Create a new envelope with the current protocol version.
    pub fn new(sequence: u64, payload: Message) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sequence,
            payload,
        }
    }

    /// Build the reply envelope for this request.
    pub fn reply(&self, payload: Message) -> Self {
        Self::new(self.sequence, payload)
    }

    /// Check that the envelope was produced by a compatible peer.
    pub fn check_version(&self) -> Result<()> {
        if self.version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: self.version,
            });
        }
        Ok(())
    }

    /// Serialize the envelope to a single line of JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize an envelope from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

/// Top-level message enum containing all message types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    // Directory messages
    /// Request to list a directory.
    FileListRequest(FileListRequest),
    /// Response with a directory listing.
    FileListResponse(FileListResponse),
    /// Request to create a directory.
    DirectoryCreateRequest(DirectoryCreateRequest),
    /// Request to delete a directory.
    DirectoryDeleteRequest(DirectoryDeleteRequest),
    /// Request for a depth-bounded directory tree.
    TreeRequest(TreeRequest),
    /// Response with a directory tree.
    TreeResponse(TreeResponse),

    // File messages
    /// Request to read a file.
    FileReadRequest(FileReadRequest),
    /// Response with file metadata and (for text files) content.
    FileReadResponse(FileRecord),
    /// Request to create or overwrite a file.
    FileWriteRequest(FileWriteRequest),
    /// Response after a successful write.
    FileWriteResponse(FileWriteResponse),
    /// Request to delete a single file.
    FileDeleteRequest(FileDeleteRequest),
    /// Upload one or more files into a directory.
    FileUploadRequest(FileUploadRequest),
    /// Response listing the uploaded files.
    FileUploadResponse(FileUploadResponse),
    /// Request to download a chunk of a file.
    FileDownloadRequest(FileDownloadRequest),
    /// Chunk of downloaded file data.
    FileDownloadChunk(FileDownloadChunk),

    // Transfer messages
    /// Rename an entry within its directory.
    RenameRequest(RenameRequest),
    /// Response with the renamed entry's new path.
    RenameResponse(RenameResponse),
    /// Recursively copy a file or directory.
    CopyRequest(CopyRequest),
    /// Move a file or directory.
    MoveRequest(MoveRequest),

    // Search messages
    /// Recursive filename and content search.
    SearchRequest(SearchRequest),
    /// Search results.
    SearchResponse(SearchResponse),

    // Control messages
    /// Generic acknowledgment for operations without a result payload.
    Ack(Ack),
    /// Ping for keepalive.
    Ping(Ping),
    /// Pong response to ping.
    Pong(Pong),
    /// Request the daemon's capabilities.
    CapabilitiesRequest,
    /// Capabilities announcement.
    Capabilities(Capabilities),
    /// Error message.
    Error(ErrorMessage),
}

impl Message {
    /// Short, stable name of the message variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::FileListRequest(_) => "list",
            Message::FileListResponse(_) => "list_response",
            Message::DirectoryCreateRequest(_) => "create_directory",
            Message::DirectoryDeleteRequest(_) => "delete_directory",
            Message::TreeRequest(_) => "tree",
            Message::TreeResponse(_) => "tree_response",
            Message::FileReadRequest(_) => "read",
            Message::FileReadResponse(_) => "read_response",
            Message::FileWriteRequest(_) => "write",
            Message::FileWriteResponse(_) => "write_response",
            Message::FileDeleteRequest(_) => "delete_file",
            Message::FileUploadRequest(_) => "upload",
            Message::FileUploadResponse(_) => "upload_response",
            Message::FileDownloadRequest(_) => "download",
            Message::FileDownloadChunk(_) => "download_chunk",
            Message::RenameRequest(_) => "rename",
            Message::RenameResponse(_) => "rename_response",
            Message::CopyRequest(_) => "copy",
            Message::MoveRequest(_) => "move",
            Message::SearchRequest(_) => "search",
            Message::SearchResponse(_) => "search_response",
            Message::Ack(_) => "ack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::CapabilitiesRequest => "capabilities",
            Message::Capabilities(_) => "capabilities_response",
            Message::Error(_) => "error",
        }
    }
}

// ============================================================================
// Shared types
// ============================================================================

/// Kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file (anything that is not a directory).
    File,
    /// Directory.
    Directory,
}

impl EntryKind {
    /// Whether this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Directory Messages
// ============================================================================

/// Request to list a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListRequest {
    /// Directory to list; empty for the root.
    #[serde(default)]
    pub path: String,
}

/// Response with a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListResponse {
    /// Path that was listed, relative to the root.
    pub current_path: String,
    /// Parent of the listed path, `None` when listing the root.
    pub parent_path: Option<String>,
    /// Entries, directories first.
    pub entries: Vec<FileEntry>,
}

/// A single file or directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: EntryKind,
    /// Path relative to the root.
    pub path: String,
    /// Language tag; `None` for directories.
    pub language: Option<String>,
    /// Size in bytes as reported by the filesystem.
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds).
    pub modified: u64,
    /// Whether the name starts with a dot.
    pub is_hidden: bool,
}

/// Request to create a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryCreateRequest {
    /// Directory to create.
    pub path: String,
    /// Create missing ancestors and tolerate an existing directory.
    #[serde(default = "default_true")]
    pub recursive: bool,
}

/// Request to delete a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryDeleteRequest {
    /// Directory to delete.
    pub path: String,
    /// Remove the whole subtree. Irreversible.
    #[serde(default)]
    pub recursive: bool,
}

/// Request for a depth-bounded directory tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRequest {
    /// Directory to start from; empty for the root.
    #[serde(default)]
    pub path: String,
    /// Maximum depth, defaults to [`DEFAULT_TREE_DEPTH`].
    #[serde(default)]
    pub max_depth: Option<u32>,
}

/// Response with a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeResponse {
    /// Path the tree starts from.
    pub path: String,
    /// Effective depth bound.
    pub max_depth: u32,
    /// Top-level nodes; `None` when the depth bound is zero.
    pub tree: Option<Vec<TreeNode>>,
}

/// A node in a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Entry name.
    pub name: String,
    /// Path relative to the root.
    pub path: String,
    /// Entry type.
    pub kind: EntryKind,
    /// Language tag for files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Children, present only for directories within the depth bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

// ============================================================================
// File Messages
// ============================================================================

/// Request to read a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReadRequest {
    /// File to read.
    pub path: String,
}

/// A file's metadata and, for text files, its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the root.
    pub path: String,
    /// File name.
    pub name: String,
    /// Language tag.
    pub language: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds).
    pub modified: u64,
    /// Whether the content sniffer classified the file as binary.
    pub is_binary: bool,
    /// File content; `None` for binary files.
    pub content: Option<String>,
}

/// Request to create or overwrite a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWriteRequest {
    /// File to write.
    pub path: String,
    /// New content.
    #[serde(default)]
    pub content: String,
    /// Create missing parent directories.
    #[serde(default)]
    pub create_directories: bool,
}

/// Response after a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWriteResponse {
    /// Path that was written.
    pub path: String,
    /// New size in bytes.
    pub size: u64,
    /// New modified timestamp (Unix epoch seconds).
    pub modified: u64,
}

/// Request to delete a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDeleteRequest {
    /// File to delete.
    pub path: String,
}

/// Upload one or more files into a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadRequest {
    /// Destination directory; empty for the root.
    #[serde(default)]
    pub path: String,
    /// Files to store.
    pub files: Vec<UploadItem>,
}

/// A single uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadItem {
    /// File name (a single path segment).
    pub name: String,
    /// File bytes.
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    /// Optional SHA-256 of `data` for verification.
    #[serde(default, with = "serde_bytes")]
    pub checksum: Option<Vec<u8>>,
}

/// Response listing the uploaded files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadResponse {
    /// One entry per stored file.
    pub files: Vec<UploadedFile>,
}

/// Result of storing one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Name supplied by the client.
    pub original_name: String,
    /// Path of the stored file relative to the root.
    pub path: String,
    /// Stored size in bytes.
    pub size: u64,
}

/// Request to download a chunk of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDownloadRequest {
    /// File to download.
    pub path: String,
    /// Starting offset (for resuming).
    #[serde(default)]
    pub offset: u64,
    /// Maximum chunk size.
    pub chunk_size: u32,
}

/// Chunk of downloaded file data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDownloadChunk {
    /// Path being downloaded.
    pub path: String,
    /// Offset of this chunk.
    pub offset: u64,
    /// Total file size.
    pub total_size: u64,
    /// The chunk data.
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    /// Whether this is the last chunk.
    pub is_last: bool,
}

// ============================================================================
// Transfer Messages
// ============================================================================

/// Rename an entry within its directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRequest {
    /// Entry to rename.
    pub old_path: String,
    /// New final path segment.
    pub new_name: String,
}

/// Response with the renamed entry's new path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameResponse {
    /// Path before the rename.
    pub old_path: String,
    /// Path after the rename.
    pub new_path: String,
}

/// Recursively copy a file or directory.
///
/// Copies are not transactional: a failed copy may leave a partial tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRequest {
    /// Entry to copy.
    pub source_path: String,
    /// Destination path.
    pub destination_path: String,
}

/// Move a file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Entry to move.
    pub source_path: String,
    /// Destination path.
    pub destination_path: String,
}

// ============================================================================
// Search Messages
// ============================================================================

/// Recursive filename and content search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Regular expression to search for.
    pub query: String,
    /// Directory to search from; empty for the root.
    #[serde(default)]
    pub path: String,
    /// Language tags to restrict file matches to; empty means all.
    #[serde(default)]
    pub file_types: Vec<String>,
    /// Match case exactly.
    #[serde(default)]
    pub case_sensitive: bool,
}

/// Search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// The query that was run.
    pub query: String,
    /// Directory the search started from.
    pub search_path: String,
    /// Number of hits before truncation.
    pub total_results: usize,
    /// Hits, truncated to the daemon's result limit.
    pub results: Vec<SearchHit>,
}

/// A file or directory matched by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Entry type.
    pub kind: EntryKind,
    /// Entry name.
    pub name: String,
    /// Path relative to the root.
    pub path: String,
    /// Language tag for files.
    pub language: Option<String>,
    /// Whether the entry name matched.
    pub filename_matched: bool,
    /// Matching lines; `None` for directories.
    pub content_matches: Option<Vec<SearchMatch>>,
}

/// A matching line inside a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    /// 1-based line number.
    pub line_number: usize,
    /// The line with surrounding whitespace trimmed.
    pub line: String,
    /// First substring of the line matched by the query.
    pub matched: String,
}

// ============================================================================
// Control Messages
// ============================================================================

/// Generic acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Human-readable summary.
    pub message: String,
    /// Path the operation applied to.
    pub path: String,
}

/// Ping for keepalive and latency measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Timestamp when ping was sent (for latency calculation).
    pub timestamp: u64,
}

/// Pong response to ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// Original timestamp from ping.
    pub timestamp: u64,
}

/// Error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code for programmatic handling.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Optional context (e.g., the request kind or path).
    pub context: Option<String>,
    /// Whether retrying the request may succeed.
    pub recoverable: bool,
}

/// Error codes for common error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Unknown or unspecified error.
    Unknown,
    /// Path escapes the root directory.
    PermissionDenied,
    /// Resource not found.
    NotFound,
    /// Expected a directory.
    NotADirectory,
    /// Expected a file.
    IsADirectory,
    /// Resource already exists.
    AlreadyExists,
    /// Directory is not empty.
    NotEmpty,
    /// Invalid request or parameters.
    InvalidRequest,
    /// Server-side error.
    InternalError,
    /// Protocol version mismatch.
    VersionMismatch,
}

/// Capabilities announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Supported protocol versions.
    pub protocol_versions: Vec<u8>,
    /// Supported operations.
    pub operations: Vec<String>,
    /// Language tags the daemon can report.
    pub languages: Vec<String>,
    /// Maximum file size accepted by write and upload.
    pub max_file_size: u64,
    /// Maximum number of search results returned.
    pub max_search_results: usize,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            protocol_versions: vec![PROTOCOL_VERSION],
            operations: [
                "list",
                "read",
                "write",
                "delete_file",
                "create_directory",
                "delete_directory",
                "rename",
                "copy",
                "move",
                "search",
                "tree",
                "upload",
                "download",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            languages: Vec::new(),
            max_file_size: 10 * 1024 * 1024, // 10MB
            max_search_results: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_version() {
        let envelope = Envelope::new(1, Message::Ping(Ping { timestamp: 12345 }));
        assert_eq!(envelope.version, PROTOCOL_VERSION);
        assert!(envelope.check_version().is_ok());
    }

    #[test]
    fn test_envelope_version_mismatch() {
        let mut envelope = Envelope::new(1, Message::CapabilitiesRequest);
        envelope.version = 9;
        let err = envelope.check_version().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: 9
            }
        ));
    }

    #[test]
    fn test_reply_keeps_sequence() {
        let request = Envelope::new(77, Message::Ping(Ping { timestamp: 5 }));
        let reply = request.reply(Message::Pong(Pong { timestamp: 5 }));
        assert_eq!(reply.sequence, 77);
        assert_eq!(reply.version, PROTOCOL_VERSION);
    }

    #[test]
    fn test_message_is_adjacently_tagged() {
        let msg = Message::FileReadRequest(FileReadRequest {
            path: "src/main.rs".to_string(),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "FileReadRequest");
        assert_eq!(json["data"]["path"], "src/main.rs");
    }

    #[test]
    fn test_request_defaults_when_fields_missing() {
        let json = r#"{"version":1,"sequence":3,"payload":{"type":"DirectoryCreateRequest","data":{"path":"a/b"}}}"#;
        let envelope = Envelope::from_json(json).unwrap();
        match envelope.payload {
            Message::DirectoryCreateRequest(req) => {
                assert_eq!(req.path, "a/b");
                assert!(req.recursive);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let json = r#"{"type":"SearchRequest","data":{"query":"todo"}}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        match msg {
            Message::SearchRequest(req) => {
                assert_eq!(req.path, "");
                assert!(req.file_types.is_empty());
                assert!(!req.case_sensitive);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let json = r#"{"type":"FileListRequest","data":{}}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg, Message::FileListRequest(FileListRequest::default()));
    }

    #[test]
    fn test_unit_variant_roundtrip() {
        let envelope = Envelope::new(4, Message::CapabilitiesRequest);
        let json = envelope.to_json().unwrap();
        assert_eq!(Envelope::from_json(&json).unwrap(), envelope);
    }

    #[test]
    fn test_tree_node_omits_absent_children() {
        let node = TreeNode {
            name: "docs".to_string(),
            path: "docs".to_string(),
            kind: EntryKind::Directory,
            language: None,
            children: None,
        };
        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get("children").is_none());
        assert!(json.get("language").is_none());
        assert_eq!(json["kind"], "directory");
    }

    #[test]
    fn test_upload_item_without_checksum() {
        let json = r#"{"name":"a.bin","data":[0,1,2]}"#;
        let item: UploadItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.data, vec![0, 1, 2]);
        assert!(item.checksum.is_none());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = Envelope::from_json("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn test_message_kind() {
        assert_eq!(Message::CapabilitiesRequest.kind(), "capabilities");
        assert_eq!(
            Message::CopyRequest(CopyRequest {
                source_path: "a".to_string(),
                destination_path: "b".to_string(),
            })
            .kind(),
            "copy"
        );
    }

    #[test]
    fn test_default_capabilities() {
        let caps = Capabilities::default();
        assert_eq!(caps.protocol_versions, vec![PROTOCOL_VERSION]);
        assert!(caps.operations.contains(&"search".to_string()));
        assert_eq!(caps.max_search_results, 100);
    }
}
