//! SQLite implementation of INodeStore
//!
//! ## Type Mapping
//!
//! | Domain Type            | SQL Type | Strategy                         |
//! |------------------------|----------|----------------------------------|
//! | NodeId                 | TEXT     | UUID string                      |
//! | ino, size (u64)        | INTEGER  | bit-for-bit cast to i64          |
//! | DateTime<Utc>          | TEXT     | RFC 3339                         |
//! | LocalActions/RemoteActions | TEXT | serde_json object, `{}` when empty |
//!
//! ## Write serialization
//!
//! Every mutation takes the store's async write lock. `update` runs the
//! record write and the descendant path rewrite in one transaction, so a
//! renamed directory and its subtree become visible together.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;

use driftsync_core::domain::path::{join_path, name_of, parent_of, ROOT};
use driftsync_core::domain::{Node, NodeId};
use driftsync_core::ports::INodeStore;

use crate::convert::{from_db_u64, parse_optional_datetime, to_db_u64};
use crate::CacheError;

type NodeQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite-based node store
#[derive(Clone)]
pub struct SqliteNodeStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteNodeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn fetch_optional(&self, query: NodeQuery<'_>) -> anyhow::Result<Option<Node>> {
        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(node_from_row).transpose()?)
    }

    async fn fetch_all(&self, query: NodeQuery<'_>) -> anyhow::Result<Vec<Node>> {
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(node_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse_node_id(s: &str) -> Result<NodeId, CacheError> {
    NodeId::from_str(s).map_err(|e| CacheError::SerializationError(e.to_string()))
}

fn node_from_row(row: &SqliteRow) -> Result<Node, CacheError> {
    let id: String = row.get("id");
    let local_parent: Option<String> = row.get("local_parent");
    let ino: Option<i64> = row.get("ino");
    let size: Option<i64> = row.get("size");
    let mtime: Option<String> = row.get("mtime");
    let ctime: Option<String> = row.get("ctime");
    let local_actions: String = row.get("local_actions");
    let remote_actions: String = row.get("remote_actions");

    Ok(Node {
        id: parse_node_id(&id)?,
        name: row.get("name"),
        parent: row.get("parent"),
        directory: row.get("directory"),
        ino: ino.map(from_db_u64),
        remote_id: row.get("remote_id"),
        remote_parent: row.get("remote_parent"),
        local_parent: local_parent.as_deref().map(parse_node_id).transpose()?,
        hash: row.get("hash"),
        version: row.get("version"),
        size: size.map(from_db_u64),
        mtime: parse_optional_datetime(mtime)?,
        ctime: parse_optional_datetime(ctime)?,
        local_actions: serde_json::from_str(&local_actions)?,
        remote_actions: serde_json::from_str(&remote_actions)?,
        download_original: row.get("download_original"),
    })
}

// ============================================================================
// Connection-level helpers (usable inside a transaction)
// ============================================================================

async fn upsert_node(conn: &mut SqliteConnection, node: &Node) -> Result<(), CacheError> {
    let local_actions = serde_json::to_string(&node.local_actions)?;
    let remote_actions = serde_json::to_string(&node.remote_actions)?;

    sqlx::query(
        "INSERT INTO nodes \
         (id, name, parent, directory, ino, remote_id, remote_parent, local_parent, \
          hash, version, size, mtime, ctime, local_actions, remote_actions, download_original) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
          name = excluded.name, parent = excluded.parent, directory = excluded.directory, \
          ino = excluded.ino, remote_id = excluded.remote_id, \
          remote_parent = excluded.remote_parent, local_parent = excluded.local_parent, \
          hash = excluded.hash, version = excluded.version, size = excluded.size, \
          mtime = excluded.mtime, ctime = excluded.ctime, \
          local_actions = excluded.local_actions, remote_actions = excluded.remote_actions, \
          download_original = excluded.download_original",
    )
    .bind(node.id.to_string())
    .bind(&node.name)
    .bind(&node.parent)
    .bind(node.directory)
    .bind(node.ino.map(to_db_u64))
    .bind(&node.remote_id)
    .bind(&node.remote_parent)
    .bind(node.local_parent.map(|p| p.to_string()))
    .bind(&node.hash)
    .bind(&node.version)
    .bind(node.size.map(to_db_u64))
    .bind(node.mtime.map(|t| t.to_rfc3339()))
    .bind(node.ctime.map(|t| t.to_rfc3339()))
    .bind(local_actions)
    .bind(remote_actions)
    .bind(node.download_original)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn fetch_by_id(conn: &mut SqliteConnection, id: &NodeId) -> Result<Option<Node>, CacheError> {
    let row = sqlx::query("SELECT * FROM nodes WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(node_from_row).transpose()
}

/// Rewrites `parent` of every record owned by `root`, then of their
/// descendants, after `root` moved away from `old_root_path`
async fn cascade_paths(
    conn: &mut SqliteConnection,
    root: &Node,
    old_root_path: &str,
) -> Result<u64, CacheError> {
    let mut pending = vec![(
        old_root_path.to_string(),
        root.path(),
        root.id,
        root.remote_id.clone(),
    )];
    let mut rewritten = 0;

    while let Some((old_path, new_path, owner, owner_remote)) = pending.pop() {
        let rows = sqlx::query(
            "SELECT * FROM nodes WHERE parent = ? \
             AND (local_parent = ? OR (? IS NOT NULL AND remote_parent = ?)) \
             ORDER BY rowid",
        )
        .bind(&old_path)
        .bind(owner.to_string())
        .bind(&owner_remote)
        .bind(&owner_remote)
        .fetch_all(&mut *conn)
        .await?;

        for row in &rows {
            let child = node_from_row(row)?;
            sqlx::query("UPDATE nodes SET parent = ? WHERE id = ?")
                .bind(&new_path)
                .bind(child.id.to_string())
                .execute(&mut *conn)
                .await?;
            rewritten += 1;

            if child.directory {
                pending.push((
                    child.path(),
                    join_path(&new_path, &child.name),
                    child.id,
                    child.remote_id.clone(),
                ));
            }
        }
    }

    Ok(rewritten)
}

/// Ids of every record owned by `id` through `local_parent`, any depth
async fn collect_descendants(
    conn: &mut SqliteConnection,
    id: &NodeId,
) -> Result<Vec<String>, CacheError> {
    let mut found = Vec::new();
    let mut pending = vec![id.to_string()];

    while let Some(owner) = pending.pop() {
        let children: Vec<String> = sqlx::query_scalar("SELECT id FROM nodes WHERE local_parent = ?")
            .bind(&owner)
            .fetch_all(&mut *conn)
            .await?;
        pending.extend(children.iter().cloned());
        found.extend(children);
    }

    Ok(found)
}

async fn delete_ids(conn: &mut SqliteConnection, ids: &[String]) -> Result<(), CacheError> {
    for id in ids {
        sqlx::query("DELETE FROM nodes WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

// ============================================================================
// INodeStore implementation
// ============================================================================

#[async_trait::async_trait]
impl INodeStore for SqliteNodeStore {
    // --- Lookups ---

    async fn find_by_id(&self, id: &NodeId) -> anyhow::Result<Option<Node>> {
        let id = id.to_string();
        self.fetch_optional(sqlx::query("SELECT * FROM nodes WHERE id = ?").bind(&id))
            .await
    }

    async fn find_by_path(&self, path: &str) -> anyhow::Result<Option<Node>> {
        if path == ROOT {
            return Ok(None);
        }
        let parent = parent_of(path);
        self.fetch_optional(
            sqlx::query("SELECT * FROM nodes WHERE parent = ? AND name = ? ORDER BY rowid LIMIT 1")
                .bind(&parent)
                .bind(name_of(path)),
        )
        .await
    }

    async fn find_by_path_excluding(
        &self,
        path: &str,
        exclude: &NodeId,
    ) -> anyhow::Result<Option<Node>> {
        if path == ROOT {
            return Ok(None);
        }
        let parent = parent_of(path);
        let exclude = exclude.to_string();
        self.fetch_optional(
            sqlx::query(
                "SELECT * FROM nodes WHERE parent = ? AND name = ? AND id != ? \
                 ORDER BY rowid LIMIT 1",
            )
            .bind(&parent)
            .bind(name_of(path))
            .bind(&exclude),
        )
        .await
    }

    async fn find_by_remote_id(&self, remote_id: &str) -> anyhow::Result<Option<Node>> {
        self.fetch_optional(
            sqlx::query("SELECT * FROM nodes WHERE remote_id = ? ORDER BY rowid LIMIT 1")
                .bind(remote_id),
        )
        .await
    }

    async fn find_by_ino(&self, ino: u64) -> anyhow::Result<Option<Node>> {
        self.fetch_optional(
            sqlx::query("SELECT * FROM nodes WHERE ino = ? ORDER BY rowid LIMIT 1")
                .bind(to_db_u64(ino)),
        )
        .await
    }

    async fn find_by_local_parent(&self, id: &NodeId) -> anyhow::Result<Vec<Node>> {
        let id = id.to_string();
        self.fetch_all(
            sqlx::query("SELECT * FROM nodes WHERE local_parent = ? ORDER BY rowid").bind(&id),
        )
        .await
    }

    async fn find_by_parent_path(
        &self,
        parent: &str,
        directories_only: bool,
    ) -> anyhow::Result<Vec<Node>> {
        self.fetch_all(
            sqlx::query(
                "SELECT * FROM nodes WHERE parent = ? AND (? = 0 OR directory = 1) ORDER BY rowid",
            )
            .bind(parent)
            .bind(directories_only),
        )
        .await
    }

    async fn query_children_by_path(
        &self,
        path: &str,
        exclude_self: bool,
    ) -> anyhow::Result<Vec<Node>> {
        if path == ROOT {
            return self
                .fetch_all(sqlx::query("SELECT * FROM nodes ORDER BY rowid"))
                .await;
        }

        // byte-wise range: every string starting with "<path>/" sorts in
        // ["<path>/", "<path>0") since '0' follows '/'
        let lower = format!("{path}/");
        let upper = format!("{path}0");
        let parent = parent_of(path);

        self.fetch_all(
            sqlx::query(
                "SELECT * FROM nodes WHERE parent = ? OR (parent >= ? AND parent < ?) \
                 OR (? = 0 AND parent = ? AND name = ?) ORDER BY rowid",
            )
            .bind(path)
            .bind(&lower)
            .bind(&upper)
            .bind(exclude_self)
            .bind(&parent)
            .bind(name_of(path)),
        )
        .await
    }

    async fn directories(&self) -> anyhow::Result<Vec<Node>> {
        self.fetch_all(sqlx::query(
            "SELECT * FROM nodes WHERE directory = 1 ORDER BY rowid",
        ))
        .await
    }

    async fn files(&self) -> anyhow::Result<Vec<Node>> {
        self.fetch_all(sqlx::query(
            "SELECT * FROM nodes WHERE directory = 0 ORDER BY rowid",
        ))
        .await
    }

    async fn files_with_actions(&self) -> anyhow::Result<Vec<Node>> {
        self.fetch_all(sqlx::query(
            "SELECT * FROM nodes WHERE directory = 0 \
             AND (local_actions != '{}' OR remote_actions != '{}') \
             ORDER BY parent, name",
        ))
        .await
    }

    async fn download_original_directories(&self) -> anyhow::Result<Vec<Node>> {
        self.fetch_all(sqlx::query(
            "SELECT * FROM nodes WHERE directory = 1 AND download_original = 1 ORDER BY rowid",
        ))
        .await
    }

    async fn nodes_with_actions(&self) -> anyhow::Result<Vec<Node>> {
        self.fetch_all(sqlx::query(
            "SELECT * FROM nodes WHERE local_actions != '{}' OR remote_actions != '{}' \
             ORDER BY parent, name",
        ))
        .await
    }

    async fn count(&self) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM nodes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    // --- Mutations ---

    async fn create(&self, node: &Node) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        upsert_node(&mut *conn, node).await?;

        tracing::trace!(node_id = %node.id, path = %node.path(), "Created node");
        Ok(())
    }

    async fn update(&self, node: &Node) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let Some(previous) = fetch_by_id(&mut *tx, &node.id).await? else {
            tracing::trace!(node_id = %node.id, "Update of a removed node ignored");
            return Ok(());
        };

        upsert_node(&mut *tx, node).await?;

        let old_path = previous.path();
        if node.directory && old_path != node.path() {
            let rewritten = cascade_paths(&mut *tx, node, &old_path).await?;
            tracing::debug!(
                from = %old_path,
                to = %node.path(),
                descendants = rewritten,
                "Rewrote descendant paths"
            );
        }

        tx.commit().await?;
        tracing::trace!(node_id = %node.id, "Updated node");
        Ok(())
    }

    async fn remove(&self, id: &NodeId) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM nodes WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        tracing::trace!(node_id = %id, "Removed node");
        Ok(())
    }

    async fn delete(&self, id: &NodeId) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut ids = collect_descendants(&mut *tx, id).await?;
        ids.push(id.to_string());
        delete_ids(&mut *tx, &ids).await?;

        tx.commit().await?;
        tracing::trace!(node_id = %id, records = ids.len(), "Deleted node subtree");
        Ok(())
    }

    async fn delete_children(&self, id: &NodeId) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let ids = collect_descendants(&mut *tx, id).await?;
        delete_ids(&mut *tx, &ids).await?;

        tx.commit().await?;
        tracing::trace!(node_id = %id, records = ids.len(), "Deleted node children");
        Ok(())
    }

    async fn purge_transient(&self) -> anyhow::Result<u64> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            "DELETE FROM nodes WHERE remote_id IS NULL OR (ino IS NULL AND download_original = 0)",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn clear_actions(&self) -> anyhow::Result<u64> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            "UPDATE nodes SET local_actions = '{}', remote_actions = '{}' \
             WHERE local_actions != '{}' OR remote_actions != '{}'",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
