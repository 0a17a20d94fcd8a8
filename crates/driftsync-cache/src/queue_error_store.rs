//! SQLite implementation of IQueueErrorStore
//!
//! The failed task is stored as one JSON column; origin, code and message
//! are kept alongside for status queries.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use driftsync_core::domain::{ErrorId, QueueError, TaskOrigin};
use driftsync_core::ports::IQueueErrorStore;

use crate::convert::parse_datetime;
use crate::CacheError;

#[derive(Clone)]
pub struct SqliteQueueErrorStore {
    pool: SqlitePool,
}

impl SqliteQueueErrorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn queue_error_from_row(row: &SqliteRow) -> Result<QueueError, CacheError> {
    let id: String = row.get("id");
    let origin: String = row.get("origin");
    let task: String = row.get("task");
    let recorded: String = row.get("recorded");

    Ok(QueueError {
        id: ErrorId::from_str(&id).map_err(|e| CacheError::SerializationError(e.to_string()))?,
        origin: TaskOrigin::from_str(&origin)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?,
        task: serde_json::from_str(&task)?,
        code: row.get("code"),
        message: row.get("message"),
        recorded: parse_datetime(&recorded)?,
    })
}

#[async_trait::async_trait]
impl IQueueErrorStore for SqliteQueueErrorStore {
    async fn insert(&self, error: &QueueError) -> anyhow::Result<()> {
        let task = serde_json::to_string(&error.task)?;

        sqlx::query(
            "INSERT OR REPLACE INTO queue_errors (id, origin, task, code, message, recorded) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(error.id.to_string())
        .bind(error.origin.to_string())
        .bind(task)
        .bind(&error.code)
        .bind(&error.message)
        .bind(error.recorded.to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::trace!(error_id = %error.id, "Saved queue error");
        Ok(())
    }

    async fn all(&self) -> anyhow::Result<Vec<QueueError>> {
        let rows = sqlx::query("SELECT * FROM queue_errors ORDER BY recorded, rowid")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(queue_error_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn remove(&self, id: &ErrorId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM queue_errors WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_errors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
