//! Domain entities and rules
//!
//! This module contains the core domain types for driftsync:
//! - Newtypes for identifiers and the remote delta cursor
//! - The node record and its pending local/remote action sets
//! - Queue tasks with their priority bands
//! - Bookkeeping records (queue errors, ignored subtrees, transfers)
//! - Path helpers and name filters
//! - Domain-specific error types

pub mod actions;
pub mod bookkeeping;
pub mod errors;
pub mod newtypes;
pub mod node;
pub mod path;
pub mod task;

// Re-export commonly used types
pub use actions::{
    LocalActions, LocalCreate, LocalDelete, LocalMove, LocalRename, RemoteActions, RemoteCreate,
    RemoteDelete, RemoteMove, RemoteRename,
};
pub use bookkeeping::{
    retention_cutoff, IgnoredNode, QueueError, TransferRecord, TransferState, RETENTION_HOURS,
};
pub use errors::DomainError;
pub use newtypes::{DeltaCursor, ErrorId, NodeId};
pub use node::{FileStat, Node, REMOTE_ROOT};
pub use task::{Task, TaskAction, TaskOrigin};
