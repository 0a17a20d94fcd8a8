//! Bookkeeping store ports (driven/secondary ports)
//!
//! The three small collections persisted next to the node records:
//! ignored remote subtrees, queue errors waiting for replay, and transfer
//! resume state.
//!
//! ## Design Notes
//!
//! - All three share the node store's backend in practice, but are separate
//!   traits so handlers only depend on the collection they touch.
//! - Timestamps are passed in by the caller; stores never read the clock.

use chrono::{DateTime, Utc};

use crate::domain::{ErrorId, IgnoredNode, QueueError, TransferRecord};

/// Port trait for the selective-sync ignore collection
#[async_trait::async_trait]
pub trait IIgnoreStore: Send + Sync {
    async fn all(&self) -> anyhow::Result<Vec<IgnoredNode>>;

    async fn ignored_remote_ids(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.all().await?.into_iter().map(|n| n.remote_id).collect())
    }

    /// Adds remote ids; ids already present are left untouched
    async fn insert(&self, remote_ids: &[String]) -> anyhow::Result<()>;

    async fn remove(&self, remote_ids: &[String]) -> anyhow::Result<()>;

    /// Replaces the stored local path of each `(remote_id, path)` pair
    async fn update_paths(&self, paths: &[(String, String)]) -> anyhow::Result<()>;

    /// True when `remote_id` is ignored or `path` lies in an ignored subtree
    async fn is_ignored(&self, path: &str, remote_id: Option<&str>) -> anyhow::Result<bool> {
        let ignored = self.all().await?;
        Ok(ignored
            .iter()
            .any(|n| remote_id == Some(n.remote_id.as_str()) || n.covers(path)))
    }
}

/// Port trait for failed tasks persisted for replay
#[async_trait::async_trait]
pub trait IQueueErrorStore: Send + Sync {
    async fn insert(&self, error: &QueueError) -> anyhow::Result<()>;

    /// All stored errors, oldest first
    async fn all(&self) -> anyhow::Result<Vec<QueueError>>;

    async fn remove(&self, id: &ErrorId) -> anyhow::Result<()>;

    async fn count(&self) -> anyhow::Result<u64>;
}

/// Port trait for upload/download resume state
#[async_trait::async_trait]
pub trait ITransferStore: Send + Sync {
    /// Looks up a record by transfer id and kind (`"upload"` or `"download"`)
    async fn find(&self, transfer_id: &str, kind: &str) -> anyhow::Result<Option<TransferRecord>>;

    /// Inserts or replaces a record
    async fn save(&self, record: &TransferRecord) -> anyhow::Result<()>;

    async fn remove(&self, transfer_id: &str, kind: &str) -> anyhow::Result<()>;

    async fn created_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<TransferRecord>>;

    /// Removes every record created before `cutoff`, returning how many went
    async fn remove_created_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}
