//! Status command - Show the state of the sync instance
//!
//! Reads the instance database directly; no remote access is needed.
//! Actions only live during a pass, so what is pending between passes are
//! the stored queue errors.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use driftsync_cache::{
    DatabasePool, InstanceLayout, SqliteIgnoreStore, SqliteNodeStore, SqliteQueueErrorStore,
};
use driftsync_core::config::Config;
use driftsync_core::domain::QueueError;
use driftsync_core::ports::{IIgnoreStore, INodeStore, IQueueErrorStore};

use crate::output::{get_formatter, plural, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// List every queued error instead of a count
    #[arg(long)]
    pub errors: bool,
}

struct InstanceStatus {
    nodes: u64,
    cursor: Option<String>,
    queue_errors: Vec<QueueError>,
    ignored: Vec<String>,
}

impl StatusCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let config = Config::load_or_default(config_path);
        let layout = InstanceLayout::new(&config.sync.instance_dir);

        if !layout.db_path().exists() {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "root": config.sync.root,
                    "synced": false,
                }));
            } else {
                formatter.warn(&format!(
                    "No sync state in {}; run 'driftsync sync' first",
                    layout.root().display()
                ));
            }
            return Ok(());
        }

        let status = read_status(&layout).await?;

        if format.is_json() {
            let errors: Vec<_> = status
                .queue_errors
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "origin": e.origin.to_string(),
                        "action": e.task.action.to_string(),
                        "path": e.task.path(),
                        "code": e.code,
                        "message": e.message,
                        "recorded": e.recorded.to_rfc3339(),
                    })
                })
                .collect();
            formatter.print_json(&serde_json::json!({
                "root": config.sync.root,
                "synced": status.cursor.is_some(),
                "nodes": status.nodes,
                "cursor": status.cursor,
                "queue_errors": errors,
                "ignored": status.ignored,
            }));
            return Ok(());
        }

        formatter.success(&format!("Sync root: {}", config.sync.root.display()));
        formatter.info(&format!("Tracked:   {}", plural(status.nodes, "node")));
        match &status.cursor {
            Some(cursor) => formatter.info(&format!("Cursor:    {cursor}")),
            None => formatter.info("Cursor:    none (next pass lists everything)"),
        }
        if !status.ignored.is_empty() {
            formatter.info(&format!("Ignored:   {}", status.ignored.join(", ")));
        }

        let pending = status.queue_errors.len() as u64;
        if pending == 0 {
            formatter.info("No failed changes pending");
        } else {
            formatter.warn(&format!("{} pending retry", plural(pending, "failed change")));
            if self.errors {
                for error in &status.queue_errors {
                    formatter.info(&format!(
                        "- {} {} {}: {}",
                        error.origin,
                        error.task.action,
                        error.task.path(),
                        error.message
                    ));
                }
            }
        }
        Ok(())
    }
}

async fn read_status(layout: &InstanceLayout) -> Result<InstanceStatus> {
    let pool = DatabasePool::new(&layout.db_path())
        .await
        .context("Failed to open instance database")?;
    let sqlite = pool.pool().clone();

    let nodes = SqliteNodeStore::new(sqlite.clone()).count().await?;
    let mut queue_errors = SqliteQueueErrorStore::new(sqlite.clone()).all().await?;
    queue_errors.sort_by_key(|e| e.recorded);
    let ignored = SqliteIgnoreStore::new(sqlite)
        .all()
        .await?
        .into_iter()
        .map(|i| match i.path {
            Some(path) => format!("{path} ({})", i.remote_id),
            None => i.remote_id,
        })
        .collect();
    let cursor = layout.last_cursor().get().await?.map(|c| c.to_string());

    pool.close().await;
    Ok(InstanceStatus {
        nodes,
        cursor,
        queue_errors,
        ignored,
    })
}
