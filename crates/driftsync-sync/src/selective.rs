//! Selective sync
//!
//! Remote subtrees can be excluded from the local tree. Excluded subtrees
//! are kept in the ignore store by remote id together with their current
//! remote path, which the scanners and the remote delta match against.
//!
//! Ignoring a subtree removes its synced content from disk. Entries the
//! user changed or created locally stay on disk; only their records go.
//! Un-ignoring a subtree flags its directory for a full re-fetch
//! (`download_original`), which the next pass turns into downloads.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use driftsync_core::domain::path::{has_invalid_chars, is_excluded, join_path, name_of, parent_of};
use driftsync_core::domain::{FileStat, Node, REMOTE_ROOT};
use driftsync_core::ports::{IIgnoreStore, ILocalFileSystem, INodeStore, IRemoteService};
use tracing::{debug, info, instrument};

use crate::context::SyncContext;
use crate::SyncError;

type BoxedResult<'a> = Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send + 'a>>;

/// Outcome of [`SelectiveSync::update_ignored_nodes`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectiveChange {
    pub ignored: Vec<String>,
    pub restored: Vec<String>,
}

pub struct SelectiveSync {
    nodes: Arc<dyn INodeStore>,
    ignored: Arc<dyn IIgnoreStore>,
    fs: Arc<dyn ILocalFileSystem>,
    remote: Arc<dyn IRemoteService>,
}

impl SelectiveSync {
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            nodes: ctx.nodes.clone(),
            ignored: ctx.ignored.clone(),
            fs: ctx.fs.clone(),
            remote: ctx.remote.clone(),
        }
    }

    pub async fn ignored_remote_ids(&self) -> Result<Vec<String>, SyncError> {
        Ok(self.ignored.ignored_remote_ids().await?)
    }

    /// Refreshes the stored remote paths of all ignored nodes
    ///
    /// Ignored collections may have been renamed or moved remotely since
    /// they were excluded.
    #[instrument(skip(self))]
    pub async fn update_ignore_db(&self) -> Result<(), SyncError> {
        let ids = self.ignored.ignored_remote_ids().await?;
        if ids.is_empty() {
            return Ok(());
        }

        let paths: Vec<(String, String)> = self
            .remote
            .get_attributes_by_ids(&ids)
            .await?
            .into_iter()
            .filter_map(|attrs| attrs.path.map(|path| (attrs.id, path)))
            .collect();
        debug!(count = paths.len(), "Refreshing ignored paths");
        self.ignored.update_paths(&paths).await?;
        Ok(())
    }

    /// Replaces the set of ignored remote ids with `ids`
    #[instrument(skip(self))]
    pub async fn update_ignored_nodes(&self, ids: &[String]) -> Result<SelectiveChange, SyncError> {
        let previous = self.ignored.ignored_remote_ids().await?;
        let change = SelectiveChange {
            ignored: ids.iter().filter(|id| !previous.contains(id)).cloned().collect(),
            restored: previous.into_iter().filter(|id| !ids.contains(id)).collect(),
        };
        info!(ignored = ?change.ignored, restored = ?change.restored, "Updating selective sync");

        // nothing synced yet, the first pass honours the new set anyway
        let fresh = self.nodes.count().await? == 0;

        if !change.ignored.is_empty() {
            self.ignored.insert(&change.ignored).await?;
            if !fresh {
                for id in &change.ignored {
                    if let Some(node) = self.nodes.find_by_remote_id(id).await? {
                        self.remove_ignored_node(node).await?;
                    }
                }
            }
        }

        if !change.restored.is_empty() {
            if !fresh {
                self.restore(&change.restored).await?;
            }
            self.ignored.remove(&change.restored).await?;
        }

        Ok(change)
    }

    async fn restore(&self, ids: &[String]) -> Result<(), SyncError> {
        for attrs in self.remote.get_attributes_by_ids(ids).await? {
            match self.nodes.find_by_remote_id(&attrs.id).await? {
                Some(mut node) => {
                    node.download_original = true;
                    self.nodes.update(&node).await?;
                }
                None => {
                    let path = attrs.path.clone().unwrap_or_default();
                    let name = attrs
                        .name
                        .clone()
                        .unwrap_or_else(|| name_of(&path).to_string());
                    let mut node = Node::new(name, parent_of(&path), true);
                    node.remote_id = Some(attrs.id.clone());
                    node.remote_parent = Some(attrs.parent.clone().unwrap_or_else(|| REMOTE_ROOT.to_string()));
                    node.download_original = true;
                    self.nodes.create(&node).await?;
                }
            }
            debug!(remote_id = %attrs.id, "Restoring ignored node");
        }
        Ok(())
    }

    /// Removes the synced content of `node` from disk
    pub fn remove_ignored_node(&self, node: Node) -> BoxedResult<'_> {
        Box::pin(async move {
            let path = node.path();
            if !node.directory {
                return self.remove_synced_file(&path, node).await;
            }

            for name in self.fs.read_dir(&path).await? {
                let child_path = join_path(&path, &name);
                if is_excluded(&name) {
                    info!(path = %child_path, "Removing file matching exclude pattern");
                    self.fs.unlink(&child_path).await?;
                    continue;
                }
                if has_invalid_chars(&name) {
                    info!(path = %child_path, "Leaving entry with invalid characters");
                    continue;
                }
                let Some(stat) = self.fs.stat(&child_path).await? else {
                    continue;
                };
                if stat.is_symlink {
                    info!(path = %child_path, "Removing symlink");
                    self.fs.unlink(&child_path).await?;
                    continue;
                }

                let Some(child) = self.nodes.find_by_ino(stat.ino).await? else {
                    // created locally and never synced, keep it
                    self.forget_path(&child_path).await?;
                    continue;
                };
                if content_changed(&stat, &child) {
                    debug!(path = %child_path, "Keeping locally modified file");
                    self.nodes.remove(&child.id).await?;
                    continue;
                }

                if stat.is_dir {
                    self.remove_ignored_node(child).await?;
                } else {
                    self.fs.unlink(&child_path).await?;
                    self.nodes.remove(&child.id).await?;
                }
            }

            if self.fs.read_dir(&path).await?.is_empty() {
                self.fs.remove_dir(&path).await?;
            }
            self.nodes.remove(&node.id).await?;
            self.forget_path(&path).await
        })
    }

    async fn remove_synced_file(&self, path: &str, node: Node) -> Result<(), SyncError> {
        if let Some(stat) = self.fs.stat(path).await? {
            if !content_changed(&stat, &node) {
                self.fs.unlink(path).await?;
            }
        }
        self.nodes.remove(&node.id).await?;
        Ok(())
    }

    async fn forget_path(&self, path: &str) -> Result<(), SyncError> {
        if let Some(node) = self.nodes.find_by_path(path).await? {
            self.nodes.remove(&node.id).await?;
        }
        Ok(())
    }
}

fn content_changed(stat: &FileStat, node: &Node) -> bool {
    if stat.is_dir {
        return false;
    }
    node.mtime != Some(stat.mtime) || node.size != Some(stat.size)
}
