//! Local delta scanner
//!
//! Compares the local tree with the node store and records what changed on
//! the records themselves (`local_actions`). Entries are matched to records
//! by inode, so a rename or move is detected as such instead of as a
//! delete + create pair.
//!
//! A scan runs in three steps:
//! 1. Records whose path is gone, or now holds a different inode, get a
//!    local delete.
//! 2. The tree is walked; every entry is matched by inode. Unknown inodes
//!    become new records, known ones get rename / move / content-change
//!    actions, and a delete set in step 1 is retracted.
//! 3. A new record sitting on the path of a record still marked deleted is
//!    folded into that record (delete + recreate at the same path).
//!
//! Unreadable directories and failing `lstat` calls abort the scan with
//! [`SyncError::Delta`]; syncing on a partial local view would delete
//! remote data.

use std::sync::Arc;

use driftsync_core::config::ContentCheck;
use driftsync_core::domain::path::{has_invalid_chars, is_excluded, join_path, ROOT};
use driftsync_core::domain::{
    FileStat, LocalActions, LocalCreate, LocalDelete, LocalMove, LocalRename, Node, NodeId,
};
use driftsync_core::ports::{IIgnoreStore, ILocalFileSystem, INodeStore};
use tracing::{debug, info, instrument};

use crate::context::SyncContext;
use crate::SyncError;

/// One directory waiting to be listed
struct PendingDir {
    path: String,
    /// Path of the directory as recorded before this scan
    old_path: Option<String>,
    record: Option<NodeId>,
}

/// Records local changes on node records
pub struct LocalDeltaScanner {
    nodes: Arc<dyn INodeStore>,
    ignored: Arc<dyn IIgnoreStore>,
    fs: Arc<dyn ILocalFileSystem>,
    content_check: ContentCheck,
}

impl LocalDeltaScanner {
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            nodes: ctx.nodes.clone(),
            ignored: ctx.ignored.clone(),
            fs: ctx.fs.clone(),
            content_check: ctx.settings.content_check,
        }
    }

    /// Runs all three steps over the whole sync root
    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<(), SyncError> {
        info!("Local delta started");
        self.find_deleted_nodes().await?;
        self.find_changes().await?;
        self.merge_recreated_nodes().await?;
        info!("Local delta finished");
        Ok(())
    }

    // ========================================================================
    // Step 1: deleted nodes
    // ========================================================================

    async fn find_deleted_nodes(&self) -> Result<(), SyncError> {
        let mut records = self.nodes.directories().await?;
        records.extend(self.nodes.files().await?);

        for mut node in records {
            // a re-fetch is pending, the node is expected to be missing
            if node.download_original {
                continue;
            }

            let path = node.path();
            if self
                .ignored
                .is_ignored(&path, node.remote_id.as_deref())
                .await?
            {
                debug!(path = %path, "Dropping record of ignored node");
                self.nodes.remove(&node.id).await?;
                continue;
            }

            let stat = self.lstat(&path).await?;
            let immediate = match stat {
                None => false,
                Some(stat) if Some(stat.ino) == node.ino => continue,
                Some(_) => true,
            };

            if !immediate && self.parent_already_gone(&node).await? {
                continue;
            }

            debug!(path = %path, immediate, "Node deleted locally");
            node.local_actions = LocalActions::deleted(immediate);
            self.nodes.update(&node).await?;
        }

        Ok(())
    }

    /// The containing directory vanished too, its delete covers this node
    async fn parent_already_gone(&self, node: &Node) -> Result<bool, SyncError> {
        let Some(parent_id) = &node.local_parent else {
            return Ok(false);
        };
        let parent = self.nodes.find_by_id(parent_id).await?;
        Ok(parent
            .and_then(|p| p.local_actions.delete)
            .is_some_and(|delete| !delete.immediate))
    }

    // ========================================================================
    // Step 2: tree walk
    // ========================================================================

    async fn find_changes(&self) -> Result<(), SyncError> {
        let mut pending = vec![PendingDir {
            path: ROOT.to_string(),
            old_path: None,
            record: None,
        }];

        while let Some(dir) = pending.pop() {
            let names = self
                .fs
                .read_dir(&dir.path)
                .await
                .map_err(|source| SyncError::Delta {
                    path: dir.path.clone(),
                    source,
                })?;

            for name in names {
                let path = join_path(&dir.path, &name);
                let Some(stat) = self.lstat(&path).await? else {
                    debug!(path = %path, "Entry vanished during scan");
                    continue;
                };

                if is_excluded(&name) {
                    debug!(path = %path, "Skipping excluded name");
                    continue;
                }
                if has_invalid_chars(&name) {
                    info!(path = %path, "Skipping name with invalid characters");
                    continue;
                }
                if stat.is_symlink {
                    debug!(path = %path, "Skipping symlink");
                    continue;
                }

                let existing = self.nodes.find_by_ino(stat.ino).await?;
                let remote_id = existing.as_ref().and_then(|n| n.remote_id.as_deref());
                if self.ignored.is_ignored(&path, remote_id).await? {
                    debug!(path = %path, "Skipping ignored entry");
                    continue;
                }

                let (id, old_path) = self
                    .analyze(&name, &dir, &stat, existing)
                    .await?;

                if stat.is_dir {
                    pending.push(PendingDir {
                        path,
                        old_path,
                        record: Some(id),
                    });
                }
            }
        }

        Ok(())
    }

    /// Records changes of one entry; returns its record id and old path
    async fn analyze(
        &self,
        name: &str,
        dir: &PendingDir,
        stat: &FileStat,
        existing: Option<Node>,
    ) -> Result<(NodeId, Option<String>), SyncError> {
        let Some(node) = existing else {
            let mut node = Node::new(name, dir.path.clone(), stat.is_dir);
            node.ino = Some(stat.ino);
            node.local_parent = dir.record;
            node.local_actions.create = Some(LocalCreate::new(false));
            debug!(path = %node.path(), "New local node");
            self.nodes.create(&node).await?;
            return Ok((node.id, None));
        };

        if node.local_actions.delete.is_none() {
            let (node, old_path) = self.detect_changes(name, dir, stat, node).await?;
            return Ok((node.id, Some(old_path)));
        }

        // marked deleted in step 1, but the inode is still around
        let path = join_path(&dir.path, name);
        let occupant = self.nodes.find_by_path(&path).await?;
        let (mut node, old_path) = self.detect_changes(name, dir, stat, node).await?;
        node.local_actions.delete = None;

        if let Some(mut occupant) = occupant.filter(|o| o.ino != node.ino) {
            let delete = occupant
                .local_actions
                .delete
                .get_or_insert_with(|| LocalDelete::new(true));
            delete.immediate = true;
            self.nodes.update(&occupant).await?;
        }

        self.nodes.update(&node).await?;
        Ok((node.id, Some(old_path)))
    }

    async fn detect_changes(
        &self,
        name: &str,
        dir: &PendingDir,
        stat: &FileStat,
        mut node: Node,
    ) -> Result<(Node, String), SyncError> {
        let path = join_path(&dir.path, name);
        let content_changed = self.content_changed(stat, &node, &path).await?;
        let old_path = node.path();

        if node.name != name {
            debug!(old = %node.name, new = %name, "Node renamed locally");
            node.local_actions.rename = Some(LocalRename::new(node.name.clone()));
            node.name = name.to_string();
        }

        if node.parent != dir.path && Some(&node.parent) != dir.old_path.as_ref() {
            debug!(old = %node.parent, new = %dir.path, "Node moved locally");
            node.local_actions.move_ = Some(LocalMove::new(node.parent.clone()));
            node.parent = dir.path.clone();
        }

        if content_changed {
            debug!(path = %path, "Content changed locally");
            node.local_actions.create = Some(LocalCreate::new(false));
        }

        if node.local_actions.len() > 1 {
            node.local_actions.delete = None;
        }

        self.nodes.update(&node).await?;
        Ok((node, old_path))
    }

    /// File content differs from what was last synced
    ///
    /// With [`ContentCheck::Fast`] unchanged mtime and size mean unchanged
    /// content; only otherwise is the file hashed.
    async fn content_changed(&self, stat: &FileStat, node: &Node, path: &str) -> Result<bool, SyncError> {
        if stat.is_dir {
            return Ok(false);
        }

        let metadata_equal = node.mtime == Some(stat.mtime) && node.size == Some(stat.size);
        let hash = match (&node.hash, self.content_check) {
            (None, _) => return Ok(!metadata_equal),
            (Some(_), ContentCheck::Fast) if metadata_equal => return Ok(false),
            (Some(hash), _) => hash,
        };

        let current = self
            .fs
            .md5(path)
            .await
            .map_err(|source| SyncError::Delta {
                path: path.to_string(),
                source,
            })?;
        Ok(&current != hash)
    }

    // ========================================================================
    // Step 3: delete + recreate at the same path
    // ========================================================================

    async fn merge_recreated_nodes(&self) -> Result<(), SyncError> {
        let mut records = self.nodes.directories().await?;
        records.extend(self.nodes.files().await?);

        for created in records {
            let Some(create) = created.local_actions.create.clone() else {
                continue;
            };
            let path = created.path();
            let Some(mut shadow) = self.nodes.find_by_path_excluding(&path, &created.id).await? else {
                continue;
            };
            if shadow.local_actions.delete.is_none() {
                continue;
            }

            let stat = self.lstat(&path).await?.ok_or_else(|| SyncError::Delta {
                path: path.clone(),
                source: anyhow::anyhow!("vanished during scan"),
            })?;

            debug!(path = %path, "Node deleted and recreated, merging records");
            shadow.ino = Some(stat.ino);
            shadow.local_actions.delete = None;
            if shadow.directory {
                shadow.apply_stat(&stat);
            } else {
                shadow.local_actions.create = Some(create);
            }
            self.nodes.update(&shadow).await?;

            for mut child in self.nodes.find_by_local_parent(&created.id).await? {
                child.local_parent = Some(shadow.id);
                self.nodes.update(&child).await?;
            }
            self.nodes.remove(&created.id).await?;
        }

        Ok(())
    }

    async fn lstat(&self, path: &str) -> Result<Option<FileStat>, SyncError> {
        self.fs.stat(path).await.map_err(|source| SyncError::Delta {
            path: path.to_string(),
            source,
        })
    }
}
