//! driftsync Sync - Bidirectional synchronization engine
//!
//! Provides:
//! - Local delta detection by inode tracking
//! - Remote delta fetching and grouping
//! - Priority-ordered application of both deltas with conflict handling
//! - Resumable transfers and stale temp-file collection
//! - Selective sync of remote subtrees
//!
//! ## Modules
//!
//! - [`engine`] - One sync pass, phase by phase
//! - [`filesystem`] - Local filesystem adapter below the sync root
//! - [`local_delta`] - Scanner recording local changes on node records
//! - [`remote_delta`] - Cursor-paginated remote change fetcher
//! - [`delta`] - Merges grouped remote changes into node records
//! - [`queue`] - Action queue, transfer queue and their handlers
//! - [`garbage_collector`] - Removes stale transfer state and temp files
//! - [`selective`] - Ignore / restore remote subtrees
//! - [`scheduler`] - Periodic and on-demand passes
//! - [`events`] - Lifecycle notifications

pub mod context;
pub mod delta;
pub mod engine;
pub mod events;
pub mod filesystem;
pub mod garbage_collector;
pub mod local_delta;
pub mod queue;
pub mod remote_delta;
pub mod scheduler;
pub mod selective;

use driftsync_core::ports::{ApiError, ApiErrorCode};
use thiserror::Error;

pub use context::SyncContext;
pub use engine::{SyncEngine, SyncReport};
pub use events::SyncEvent;
pub use filesystem::LocalFileSystem;
pub use scheduler::{PassRunner, SyncScheduler};

/// Errors that end a sync pass
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local tree could not be read completely
    #[error("Local delta failed at {path}: {source}")]
    Delta {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// The server discarded the stored cursor; the state has to be rebuilt
    #[error("Remote reset the delta cursor, a full resync is required")]
    RemoteReset,

    /// Credentials were rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A node carries action flags that can never be applied
    #[error("Invalid actions on {path}: {reason}")]
    InvalidActions { path: String, reason: String },

    /// Any other remote failure outside the queue
    #[error("Remote error: {0}")]
    Remote(ApiError),

    /// Storage or conflict resolution failure
    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Instance directory or configuration problem
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SyncError::Unauthorized(_))
    }

    /// Code of the remote failure, if this is one
    pub fn api_code(&self) -> Option<ApiErrorCode> {
        match self {
            SyncError::Remote(api) => Some(api.code),
            SyncError::Unauthorized(_) => Some(ApiErrorCode::Unauthorized),
            _ => None,
        }
    }

    /// Stable code stored with queue errors
    pub fn code(&self) -> Option<String> {
        self.api_code().map(|code| code.to_string())
    }
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        if err.is_unauthorized() {
            SyncError::Unauthorized(err.message)
        } else {
            SyncError::Remote(err)
        }
    }
}

impl From<driftsync_conflict::ConflictError> for SyncError {
    fn from(err: driftsync_conflict::ConflictError) -> Self {
        match err {
            driftsync_conflict::ConflictError::Remote(api) => api.into(),
            other => SyncError::Store(other.into()),
        }
    }
}

impl From<driftsync_cache::CacheError> for SyncError {
    fn from(err: driftsync_cache::CacheError) -> Self {
        SyncError::Store(err.into())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
