//! SQLite implementation of IIgnoreStore

use sqlx::{Row, SqlitePool};

use driftsync_core::domain::IgnoredNode;
use driftsync_core::ports::IIgnoreStore;

/// Selective-sync exclusions, keyed by remote id
#[derive(Clone)]
pub struct SqliteIgnoreStore {
    pool: SqlitePool,
}

impl SqliteIgnoreStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IIgnoreStore for SqliteIgnoreStore {
    async fn all(&self) -> anyhow::Result<Vec<IgnoredNode>> {
        let rows = sqlx::query("SELECT remote_id, path FROM ignored_nodes ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| IgnoredNode {
                remote_id: row.get("remote_id"),
                path: row.get("path"),
            })
            .collect())
    }

    async fn insert(&self, remote_ids: &[String]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for remote_id in remote_ids {
            sqlx::query("INSERT OR IGNORE INTO ignored_nodes (remote_id) VALUES (?)")
                .bind(remote_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::debug!(count = remote_ids.len(), "Ignored remote nodes added");
        Ok(())
    }

    async fn remove(&self, remote_ids: &[String]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for remote_id in remote_ids {
            sqlx::query("DELETE FROM ignored_nodes WHERE remote_id = ?")
                .bind(remote_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::debug!(count = remote_ids.len(), "Ignored remote nodes removed");
        Ok(())
    }

    async fn update_paths(&self, paths: &[(String, String)]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for (remote_id, path) in paths {
            sqlx::query("UPDATE ignored_nodes SET path = ? WHERE remote_id = ?")
                .bind(path)
                .bind(remote_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
