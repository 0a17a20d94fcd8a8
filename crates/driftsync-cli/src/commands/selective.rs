//! Selective command - Exclude remote subtrees from syncing
//!
//! Ignored subtrees are identified by remote id. Ignoring a subtree removes
//! its synced copy from disk; restoring it downloads it again on the next
//! pass.

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;
use driftsync_sync::selective::{SelectiveChange, SelectiveSync};

use super::{load_valid_config, open_context};
use crate::output::{get_formatter, plural, OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum SelectiveCommand {
    /// List ignored subtrees
    List,
    /// Replace the ignored set
    Set {
        /// Remote ids to ignore; an empty list restores everything
        ids: Vec<String>,
    },
    /// Ignore more subtrees
    Add {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Stop ignoring subtrees
    Remove {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

impl SelectiveCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let config = load_valid_config(config_path)?;
        let (ctx, pool) = open_context(&config).await?;

        let result = match self {
            SelectiveCommand::List => {
                let ignored = ctx.ignored.all().await;
                pool.close().await;
                let ignored = ignored?;
                if format.is_json() {
                    let items: Vec<_> = ignored
                        .iter()
                        .map(|i| serde_json::json!({ "remote_id": i.remote_id, "path": i.path }))
                        .collect();
                    formatter.print_json(&serde_json::json!({ "ignored": items }));
                } else if ignored.is_empty() {
                    formatter.success("Nothing is ignored");
                } else {
                    formatter.success(&format!("{} ignored", plural(ignored.len() as u64, "subtree")));
                    for node in &ignored {
                        formatter.info(&format!(
                            "{} {}",
                            node.remote_id,
                            node.path.as_deref().unwrap_or("(path unknown)")
                        ));
                    }
                }
                return Ok(());
            }
            other => {
                let selective = SelectiveSync::new(&ctx);
                let current = selective.ignored_remote_ids().await;
                match current {
                    Ok(current) => {
                        let ids = other.target_set(current);
                        selective.update_ignored_nodes(&ids).await
                    }
                    Err(e) => Err(e),
                }
            }
        };

        pool.close().await;
        print_change(formatter.as_ref(), format, &result?);
        Ok(())
    }

    /// The ignored set after applying this command to `current`
    fn target_set(&self, mut current: Vec<String>) -> Vec<String> {
        match self {
            SelectiveCommand::List => current,
            SelectiveCommand::Set { ids } => dedup(ids.clone()),
            SelectiveCommand::Add { ids } => {
                current.extend(ids.iter().cloned());
                dedup(current)
            }
            SelectiveCommand::Remove { ids } => {
                current.retain(|id| !ids.contains(id));
                current
            }
        }
    }
}

fn dedup(mut ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
    ids
}

fn print_change(formatter: &dyn OutputFormatter, format: OutputFormat, change: &SelectiveChange) {
    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "ignored": change.ignored,
            "restored": change.restored,
        }));
        return;
    }
    if change.ignored.is_empty() && change.restored.is_empty() {
        formatter.success("Selective sync unchanged");
        return;
    }
    formatter.success("Selective sync updated");
    for id in &change.ignored {
        formatter.info(&format!("ignored  {id}"));
    }
    for id in &change.restored {
        formatter.info(&format!("restored {id}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn add_keeps_existing_ids_once() {
        let cmd = SelectiveCommand::Add { ids: ids(&["b", "c"]) };
        assert_eq!(cmd.target_set(ids(&["a", "b"])), ids(&["a", "b", "c"]));
    }

    #[test]
    fn remove_drops_only_named_ids() {
        let cmd = SelectiveCommand::Remove { ids: ids(&["a"]) };
        assert_eq!(cmd.target_set(ids(&["a", "b"])), ids(&["b"]));
    }

    #[test]
    fn set_replaces_everything() {
        let cmd = SelectiveCommand::Set { ids: ids(&["x", "x"]) };
        assert_eq!(cmd.target_set(ids(&["a"])), ids(&["x"]));
    }
}
