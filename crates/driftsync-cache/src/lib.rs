//! driftsync Cache - Durable sync state
//!
//! SQLite-based persistence for:
//! - Node records with their pending action sets
//! - Ignored remote subtrees (selective sync)
//! - Queue errors awaiting replay
//! - Transfer resume state
//!
//! plus the plain-file pieces of an instance directory: the last remote
//! cursor and the temp directory.
//!
//! ## Architecture
//!
//! This crate implements the storage ports from `driftsync-core`
//! (`INodeStore`, `IIgnoreStore`, `IQueueErrorStore`, `ITransferStore`).
//! It is a driven (secondary) adapter in the hexagonal architecture.
//!
//! ## Usage
//!
//! ```no_run
//! use driftsync_cache::{DatabasePool, InstanceLayout, SqliteNodeStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let layout = InstanceLayout::new("/home/user/.local/share/driftsync");
//! layout.prepare()?;
//! let pool = DatabasePool::new(&layout.db_path()).await?;
//! let nodes = SqliteNodeStore::new(pool.pool().clone());
//! // Use nodes as INodeStore...
//! # Ok(())
//! # }
//! ```

mod convert;
pub mod cursor;
pub mod ignore_store;
pub mod instance;
pub mod node_store;
pub mod pool;
pub mod queue_error_store;
pub mod transfer_store;

pub use cursor::LastCursor;
pub use ignore_store::SqliteIgnoreStore;
pub use instance::InstanceLayout;
pub use node_store::SqliteNodeStore;
pub use pool::DatabasePool;
pub use queue_error_store::SqliteQueueErrorStore;
pub use transfer_store::SqliteTransferStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Instance directory or cursor file could not be accessed
    #[error("Instance I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}
