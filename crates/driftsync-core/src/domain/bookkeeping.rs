//! Durable bookkeeping records
//!
//! Everything besides node records that survives between passes:
//! failed tasks waiting for replay, remote subtrees excluded by selective
//! sync, and the state of interrupted transfers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::ErrorId;
use super::path::{is_in_subtree, ROOT};
use super::task::{Task, TaskOrigin};

/// Age after which queue errors and transfer leftovers are discarded
pub const RETENTION_HOURS: i64 = 48;

/// Cutoff for [`RETENTION_HOURS`] relative to `now`
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(RETENTION_HOURS)
}

// ============================================================================
// Queue errors
// ============================================================================

/// A task that failed with a retryable error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueError {
    pub id: ErrorId,
    pub origin: TaskOrigin,
    pub task: Task,
    /// Error classification reported by the failing collaborator
    pub code: Option<String>,
    pub message: String,
    pub recorded: DateTime<Utc>,
}

impl QueueError {
    pub fn new(origin: TaskOrigin, task: Task, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            id: ErrorId::new(),
            origin,
            task,
            code,
            message: message.into(),
            recorded: Utc::now(),
        }
    }

    /// True once the failed change is older than the retention window
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.task.created <= retention_cutoff(now)
    }
}

// ============================================================================
// Selective sync
// ============================================================================

/// A remote subtree excluded from local materialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredNode {
    pub remote_id: String,
    /// Local path of the subtree; refreshed from remote at the start of each pass
    pub path: Option<String>,
}

impl IgnoredNode {
    /// True when `path` is this subtree or lies below it
    pub fn covers(&self, path: &str) -> bool {
        match &self.path {
            Some(ignored) if ignored != ROOT => is_in_subtree(path, ignored),
            _ => false,
        }
    }
}

// ============================================================================
// Transfers
// ============================================================================

/// Resume state of one transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransferState {
    Upload {
        /// Server-side grouping key for the uploaded chunks
        chunk_group: String,
        chunks_complete: u64,
    },
    Download {
        /// File name inside the instance temp directory
        temp_name: String,
    },
}

/// Bookkeeping for an upload or download that may be resumed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Node id for uploads, `<remote id>-<version>` for downloads
    pub transfer_id: String,
    pub state: TransferState,
    pub created: DateTime<Utc>,
}

impl TransferRecord {
    pub fn upload(transfer_id: impl Into<String>) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            state: TransferState::Upload {
                chunk_group: uuid::Uuid::new_v4().to_string(),
                chunks_complete: 0,
            },
            created: Utc::now(),
        }
    }

    pub fn download(transfer_id: impl Into<String>) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            state: TransferState::Download {
                temp_name: uuid::Uuid::new_v4().to_string(),
            },
            created: Utc::now(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.state {
            TransferState::Upload { .. } => "upload",
            TransferState::Download { .. } => "download",
        }
    }

    pub fn temp_name(&self) -> Option<&str> {
        match &self.state {
            TransferState::Download { temp_name } => Some(temp_name),
            TransferState::Upload { .. } => None,
        }
    }
}
