//! Error types for conflict resolution

use driftsync_core::ports::ApiError;
use thiserror::Error;

/// Errors that can occur while resolving conflicts
#[derive(Debug, Error)]
pub enum ConflictError {
    /// A local entry occupies a target path but no record owns its inode
    #[error("no record owns inode {ino} found at {path}")]
    UntrackedOccupant { path: String, ino: u64 },

    /// A remote node has to be renamed but its remote id is unknown
    #[error("no remote id for {0}")]
    MissingRemoteId(String),

    /// The remote service refused a conflict rename
    #[error("remote rename failed: {0}")]
    Remote(#[from] ApiError),

    /// Storage or filesystem error
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
