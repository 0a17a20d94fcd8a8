//! driftsync Conflict - Conflict naming and resolution
//!
//! Provides:
//! - Conflict names for local copies, remote copies and read-only rescue collections
//! - Resolution of nodes that changed on both sides within one cycle
//! - Detection of local entries occupying the path a remote change targets
//! - Rescue of local changes below directories the other side deleted

pub mod error;
pub mod namer;
pub mod removal;
pub mod resolver;

pub use error::ConflictError;
pub use namer::ConflictNamer;
pub use removal::RemovalConflicts;
pub use resolver::ConflictResolver;
