//! SQLite implementation of ITransferStore

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use driftsync_core::domain::TransferRecord;
use driftsync_core::ports::ITransferStore;

use crate::convert::parse_datetime;
use crate::CacheError;

#[derive(Clone)]
pub struct SqliteTransferStore {
    pool: SqlitePool,
}

impl SqliteTransferStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn transfer_from_row(row: &SqliteRow) -> Result<TransferRecord, CacheError> {
    let state: String = row.get("state");
    let created: String = row.get("created");

    Ok(TransferRecord {
        transfer_id: row.get("transfer_id"),
        state: serde_json::from_str(&state)?,
        created: parse_datetime(&created)?,
    })
}

#[async_trait::async_trait]
impl ITransferStore for SqliteTransferStore {
    async fn find(&self, transfer_id: &str, kind: &str) -> anyhow::Result<Option<TransferRecord>> {
        let row = sqlx::query("SELECT * FROM transfers WHERE transfer_id = ? AND kind = ?")
            .bind(transfer_id)
            .bind(kind)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(transfer_from_row).transpose()?)
    }

    async fn save(&self, record: &TransferRecord) -> anyhow::Result<()> {
        let state = serde_json::to_string(&record.state)?;

        sqlx::query(
            "INSERT OR REPLACE INTO transfers (transfer_id, kind, state, created) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&record.transfer_id)
        .bind(record.kind())
        .bind(state)
        .bind(record.created.to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::trace!(transfer_id = %record.transfer_id, kind = record.kind(), "Saved transfer");
        Ok(())
    }

    async fn remove(&self, transfer_id: &str, kind: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM transfers WHERE transfer_id = ? AND kind = ?")
            .bind(transfer_id)
            .bind(kind)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn created_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<TransferRecord>> {
        let rows = sqlx::query("SELECT * FROM transfers ORDER BY created")
            .fetch_all(&self.pool)
            .await?;

        // compared in Rust: stored offsets may differ from the cutoff's
        let mut records = Vec::new();
        for row in &rows {
            let record = transfer_from_row(row)?;
            if record.created < cutoff {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn remove_created_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let stale = self.created_before(cutoff).await?;
        let mut tx = self.pool.begin().await?;
        for record in &stale {
            sqlx::query("DELETE FROM transfers WHERE transfer_id = ? AND kind = ?")
                .bind(&record.transfer_id)
                .bind(record.kind())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(stale.len() as u64)
    }
}
