//! Remote service port (driven/secondary port)
//!
//! The capability set the engine consumes from the remote storage service:
//! collection/node mutations, chunked upload, resumable download, attribute
//! lookups and the paginated change stream.
//!
//! ## Design Notes
//!
//! - Unlike the storage ports this trait returns a typed [`ApiError`]: the
//!   queue handlers branch on [`ApiErrorCode`] to pick between conflict
//!   handling, rescheduling, aborting and persisting the failure.
//! - Remote paths are sync-root-relative, exactly like local paths.
//! - Unrecognized failures map to [`ApiErrorCode::Unknown`], which callers
//!   treat as retryable.

use std::fmt::{self, Display, Formatter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::DeltaCursor;

// ============================================================================
// Errors
// ============================================================================

/// Stable classification of remote failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    Unauthorized,
    NotFound,
    AlreadyExists,
    NodeReadOnly,
    ReadOnlyShare,
    ShareCantBeChildOfShare,
    DestinationNotFound,
    UploadAborted,
    DownloadAborted,
    SourceNotFound,
    Transport,
    Unknown,
}

impl Display for ApiErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApiErrorCode::Unauthorized => "unauthorized",
            ApiErrorCode::NotFound => "not_found",
            ApiErrorCode::AlreadyExists => "already_exists",
            ApiErrorCode::NodeReadOnly => "node_read_only",
            ApiErrorCode::ReadOnlyShare => "read_only_share",
            ApiErrorCode::ShareCantBeChildOfShare => "share_cant_be_child_of_share",
            ApiErrorCode::DestinationNotFound => "destination_not_found",
            ApiErrorCode::UploadAborted => "upload_aborted",
            ApiErrorCode::DownloadAborted => "download_aborted",
            ApiErrorCode::SourceNotFound => "source_not_found",
            ApiErrorCode::Transport => "transport",
            ApiErrorCode::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// A failed remote call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The node or an ancestor share refuses writes
    pub fn is_readonly(&self) -> bool {
        matches!(
            self.code,
            ApiErrorCode::NodeReadOnly | ApiErrorCode::ReadOnlyShare
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == ApiErrorCode::Unauthorized
    }
}

// ============================================================================
// Change stream
// ============================================================================

/// One entry of a delta page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDeltaNode {
    pub id: String,
    /// Root-relative path of the node
    pub path: String,
    /// Remote id of the containing collection; `None` at the root
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub directory: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Where a delta listing starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaRequest {
    /// Changes since `cursor`, or a full listing when `None`
    Cursor(Option<DeltaCursor>),
    /// Full listing of the subtree below one remote node
    Node(String),
}

/// One page of the change stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDeltaPage {
    /// Cursor to continue from
    pub cursor: Option<DeltaCursor>,
    pub has_more: bool,
    /// The server discarded the requested cursor
    pub reset: bool,
    pub nodes: Vec<RemoteDeltaNode>,
}

// ============================================================================
// Attributes and transfers
// ============================================================================

/// Attributes of one remote node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAttributes {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub readonly: bool,
    /// The node is a share root
    #[serde(default)]
    pub share: bool,
    /// Share access level (`"r"` or `"rw"`)
    #[serde(default)]
    pub access: Option<String>,
}

impl RemoteAttributes {
    /// Writes below this node are refused
    pub fn blocks_writes(&self) -> bool {
        self.readonly || (self.share && self.access.as_deref() == Some("r"))
    }
}

/// One chunk of a file upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadChunk {
    /// Root-relative target path
    pub path: String,
    /// Existing remote node the content replaces
    pub remote_id: Option<String>,
    /// Groups the chunks of one upload
    pub chunk_group: String,
    /// Zero-based chunk index
    pub index: u64,
    pub total_chunks: u64,
    pub total_size: u64,
    pub data: Vec<u8>,
}

/// Identity of a finished upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub remote_id: String,
    pub version: String,
    pub hash: String,
}

// ============================================================================
// Trait
// ============================================================================

/// Port trait for the remote storage service
#[async_trait::async_trait]
pub trait IRemoteService: Send + Sync {
    /// Creates a collection at `path`, returning its remote id
    async fn create_collection(&self, path: &str) -> Result<String, ApiError>;

    async fn rename_node(&self, remote_id: &str, name: &str) -> Result<(), ApiError>;

    /// Moves a node below the collection at `destination` (a root-relative path)
    async fn move_node(&self, remote_id: &str, destination: &str) -> Result<(), ApiError>;

    async fn delete_node(&self, remote_id: &str) -> Result<(), ApiError>;

    /// Stores one chunk; the last chunk returns the new identity
    async fn upload_chunk(&self, chunk: UploadChunk) -> Result<Option<UploadedFile>, ApiError>;

    /// Appends the content from `offset` on to `dest`, returning the bytes written
    async fn download_file(
        &self,
        remote_id: &str,
        version: Option<&str>,
        offset: u64,
        dest: &Path,
    ) -> Result<u64, ApiError>;

    /// Attributes of the node at a root-relative path
    async fn get_attributes(&self, path: &str) -> Result<RemoteAttributes, ApiError>;

    /// Attributes of several nodes; unknown ids are left out
    async fn get_attributes_by_ids(&self, ids: &[String]) -> Result<Vec<RemoteAttributes>, ApiError>;

    async fn node_delta(&self, request: &DeltaRequest) -> Result<RemoteDeltaPage, ApiError>;
}
