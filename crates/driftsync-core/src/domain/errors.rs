//! Domain error types
//!
//! Errors raised while constructing or validating domain values:
//! identifiers, cursors, paths and the action-set invariants of a node.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid remote delta cursor
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// A node carries a combination of pending actions that can never be applied
    #[error("Invalid actions on '{path}': {reason}")]
    InvalidActions {
        /// Local path of the offending node
        path: String,
        /// Which rule was broken
        reason: String,
    },

    /// Unknown enum tag read back from storage
    #[error("Unknown {kind}: {value}")]
    UnknownVariant {
        /// Name of the enum
        kind: &'static str,
        /// The value that failed to parse
        value: String,
    },
}
