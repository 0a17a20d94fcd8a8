//! Delta-stage conflict resolution
//!
//! Runs after the remote delta has been merged into a node record that
//! already carries local actions, i.e. the node changed on both sides since
//! the last sync.
//!
//! ## Rules
//!
//! Directories:
//! - create + create: both sides made the same collection, adopt the remote identity
//! - rename + rename, move + move: the remote side wins
//! - remote create + local delete: the local delete is dropped
//! - remote delete + local create: the remote delete is dropped
//!
//! Files:
//! - create + create with equal content: adopt the remote identity
//! - create + create with different content: keep both, the local copy moves
//!   aside under a conflict name
//! - delete + delete: the record is dropped
//!
//! Afterwards every node with a remote create, rename or move is checked for
//! a different local entry sitting on its target path; that entry is renamed
//! to a conflict name, and when the local rename fails the remote node is
//! renamed instead.

use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, warn};

use driftsync_core::domain::path::join_path;
use driftsync_core::domain::{LocalActions, LocalCreate, LocalRename, Node, RemoteActions};
use driftsync_core::ports::{ILocalFileSystem, INodeStore, IRemoteService};

use crate::error::ConflictError;
use crate::namer::ConflictNamer;

/// Resolves nodes that changed on both sides
pub struct ConflictResolver {
    nodes: Arc<dyn INodeStore>,
    fs: Arc<dyn ILocalFileSystem>,
    remote: Arc<dyn IRemoteService>,
    namer: ConflictNamer,
}

impl ConflictResolver {
    pub fn new(
        nodes: Arc<dyn INodeStore>,
        fs: Arc<dyn ILocalFileSystem>,
        remote: Arc<dyn IRemoteService>,
        namer: ConflictNamer,
    ) -> Self {
        Self {
            nodes,
            fs,
            remote,
            namer,
        }
    }

    /// Resolves both-sided changes on `node`, then target-path occupants
    ///
    /// Resolving a file may split it into two records; the split-off record
    /// is resolved in turn.
    pub async fn resolve(&self, node: Node) -> Result<(), ConflictError> {
        let mut pending = vec![node];

        while let Some(node) = pending.pop() {
            let resolved = if node.directory {
                Some(self.resolve_directory_conflicts(node).await?)
            } else {
                let (resolved, split) = self.resolve_file_conflicts(node).await?;
                pending.extend(split);
                resolved
            };

            if let Some(node) = resolved {
                self.find_local_conflict(node).await?;
            }
        }

        Ok(())
    }

    // ========================================================================
    // Both-sided changes
    // ========================================================================

    async fn resolve_directory_conflicts(&self, mut node: Node) -> Result<Node, ConflictError> {
        if node.remote_actions.is_empty() || node.local_actions.is_empty() {
            return Ok(node);
        }

        if node.remote_actions.create.is_some() && node.local_actions.create.is_some() {
            debug!(path = %node.path(), "Collection created on both sides");
            if let Some(create) = &node.remote_actions.create {
                node.remote_id = create.remote_id.clone();
                node.remote_parent = create.remote_parent.clone();
            }
            node.remote_actions = RemoteActions::default();
            node.local_actions = LocalActions::default();
        }

        if node.remote_actions.rename.is_some() && node.local_actions.rename.is_some() {
            node.local_actions.rename = None;
        }

        if node.remote_actions.move_.is_some() && node.local_actions.move_.is_some() {
            node.local_actions.move_ = None;
        }

        if node.remote_actions.create.is_some() && node.local_actions.delete.is_some() {
            node.local_actions.delete = None;
        }

        if node.remote_actions.delete.is_some() && node.local_actions.create.is_some() {
            node.remote_actions.delete = None;
        }

        self.nodes.update(&node).await?;
        Ok(node)
    }

    /// Returns the resolved node (`None` if it was dropped) and a split-off record
    async fn resolve_file_conflicts(
        &self,
        mut node: Node,
    ) -> Result<(Option<Node>, Option<Node>), ConflictError> {
        if node.remote_actions.is_empty() || node.local_actions.is_empty() {
            return Ok((Some(node), None));
        }

        let created_locally = node.local_actions.create.is_some();
        if let (Some(remote_create), true) = (node.remote_actions.create.clone(), created_locally) {
            let path = node.path();
            let local_hash = self.fs.md5(&path).await?;
            let stat = self
                .fs
                .stat(&path)
                .await?
                .ok_or_else(|| anyhow::anyhow!("{path} vanished during conflict resolution"))?;

            let same_content = remote_create.hash.as_deref() == Some(local_hash.as_str())
                && remote_create.size == Some(stat.size);

            if same_content {
                debug!(path = %path, "File created on both sides with equal content");
                node.remote_actions = RemoteActions::default();
                node.local_actions = LocalActions::default();
                node.hash = Some(local_hash);
                node.version = remote_create.version.clone();
                node.apply_stat(&stat);
                node.remote_id = remote_create.remote_id.clone();
                node.remote_parent = remote_create.remote_parent.clone();
                self.nodes.update(&node).await?;
                return Ok((Some(node), None));
            }

            if node.remote_actions.delete.is_none() {
                info!(path = %path, "File created on both sides with different content, keeping both");
                let name = node
                    .remote_actions
                    .rename
                    .as_ref()
                    .map(|r| r.remote_name.clone())
                    .unwrap_or_else(|| node.name.clone());
                let parent = node
                    .remote_actions
                    .move_
                    .as_ref()
                    .map(|m| m.parent.clone())
                    .unwrap_or_else(|| node.parent.clone());

                let mut split = Node::new(name, parent, false);
                split.remote_id = node.remote_id.clone();
                split.remote_parent = node
                    .remote_actions
                    .move_
                    .as_ref()
                    .map(|m| m.remote_parent.clone())
                    .or_else(|| remote_create.remote_parent.clone());
                split.remote_actions = RemoteActions::created(remote_create);
                self.nodes.create(&split).await?;

                node.remote_actions = RemoteActions::default();
                node.remote_parent = None;
                node.remote_id = None;
                node.hash = None;
                node.version = None;
                self.nodes.update(&node).await?;

                return Ok((Some(node), Some(split)));
            }
        }

        if node.remote_actions.delete.is_some() && node.local_actions.delete.is_some() {
            debug!(path = %node.path(), "File deleted on both sides");
            self.nodes.delete(&node.id).await?;
            return Ok((None, None));
        }

        Ok((Some(node), None))
    }

    // ========================================================================
    // Target path occupants
    // ========================================================================

    async fn find_local_conflict(&self, node: Node) -> Result<(), ConflictError> {
        let remote = &node.remote_actions;
        if remote.create.is_none() && remote.rename.is_none() && remote.move_.is_none() {
            return Ok(());
        }

        let name = remote
            .rename
            .as_ref()
            .map(|r| r.remote_name.clone())
            .unwrap_or_else(|| node.name.clone());
        let parent = remote
            .move_
            .as_ref()
            .map(|m| m.parent.clone())
            .unwrap_or_else(|| node.parent.clone());
        let target = join_path(&parent, &name);

        let Some(stat) = self.fs.stat(&target).await? else {
            return Ok(());
        };
        if node.ino == Some(stat.ino) {
            return Ok(());
        }

        let mut occupant = self.nodes.find_by_ino(stat.ino).await?.ok_or_else(|| {
            ConflictError::UntrackedOccupant {
                path: target.clone(),
                ino: stat.ino,
            }
        })?;

        // the occupant leaves the path on its own
        let leaving = &occupant.remote_actions;
        if leaving.rename.is_some() || leaving.move_.is_some() || leaving.delete.is_some() {
            return Ok(());
        }

        if node.directory
            && occupant.remote_id.is_some()
            && !occupant.local_actions.has_rename_or_move()
        {
            occupant.remote_actions = RemoteActions::deleted();
            occupant.local_actions = LocalActions {
                create: Some(LocalCreate::new(false)),
                ..LocalActions::default()
            };
        }

        self.rename_conflict_node(&parent, &target, &name, node, occupant)
            .await
    }

    /// Moves the local occupant of `target` aside; renames `node` remotely if that fails
    async fn rename_conflict_node(
        &self,
        parent: &str,
        target: &str,
        name: &str,
        node: Node,
        mut occupant: Node,
    ) -> Result<(), ConflictError> {
        let new_name = self
            .namer
            .unique_local_name(self.fs.as_ref(), parent, name)
            .await?;

        if let Err(err) = self.fs.rename(target, &join_path(parent, &new_name)).await {
            warn!(path = %target, error = %err, "Could not move local conflict aside, renaming remote node");
            return self.rename_remote_node(node, name).await;
        }

        info!(path = %target, new_name = %new_name, "Moved conflicting local entry aside");
        occupant.name = new_name;
        if occupant.local_actions.create.is_none() && occupant.local_actions.rename.is_none() {
            occupant.local_actions.rename = Some(LocalRename::new(name));
        }
        self.nodes.update(&occupant).await?;
        Ok(())
    }

    async fn rename_remote_node(&self, mut node: Node, name: &str) -> Result<(), ConflictError> {
        let new_name =
            ConflictNamer::remote_conflict_name(name, &ConflictNamer::date_stamp(Local::now()));

        let old_path = node.path();
        if node.remote_actions.create.is_none() && self.fs.exists(&old_path).await? {
            self.fs
                .rename(&old_path, &join_path(&node.parent, &new_name))
                .await?;
        }

        let remote_id = node
            .remote_id
            .clone()
            .or_else(|| {
                node.remote_actions
                    .create
                    .as_ref()
                    .and_then(|c| c.remote_id.clone())
            })
            .ok_or_else(|| ConflictError::MissingRemoteId(old_path.clone()))?;

        node.name = new_name;
        self.remote.rename_node(&remote_id, &node.name).await?;
        info!(path = %old_path, new_name = %node.name, "Renamed remote node to resolve a conflict");

        node.remote_actions.rename = None;
        self.nodes.update(&node).await?;
        Ok(())
    }
}
