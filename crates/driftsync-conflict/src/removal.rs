//! Directory removal conflicts
//!
//! A directory deleted on one side may still contain entries the other side
//! created or moved in during the same cycle. Instead of deleting those, the
//! directory is recreated on the deleting side and only its unchanged direct
//! children are removed. Subdirectories are resolved the same way when the
//! directory walk reaches them.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use driftsync_core::domain::path::join_path;
use driftsync_core::domain::{
    LocalActions, LocalCreate, LocalDelete, LocalRename, Node, NodeId, RemoteActions,
    RemoteCreate, RemoteDelete, TaskOrigin,
};
use driftsync_core::ports::{ILocalFileSystem, INodeStore};

use crate::error::ConflictError;
use crate::namer::ConflictNamer;

/// Rescues children of directories that are about to be removed
pub struct RemovalConflicts {
    nodes: Arc<dyn INodeStore>,
    fs: Arc<dyn ILocalFileSystem>,
    namer: ConflictNamer,
}

impl RemovalConflicts {
    pub fn new(
        nodes: Arc<dyn INodeStore>,
        fs: Arc<dyn ILocalFileSystem>,
        namer: ConflictNamer,
    ) -> Self {
        Self { nodes, fs, namer }
    }

    /// Resolves pending deletes on `node` against changes below it
    ///
    /// Returns the node as it should be scheduled afterwards.
    pub async fn resolve(&self, node: Node) -> Result<Node, ConflictError> {
        let node = self.process(node, TaskOrigin::Remote).await?;
        self.process(node, TaskOrigin::Local).await
    }

    /// `source` is the side that deleted the directory
    async fn process(&self, mut node: Node, source: TaskOrigin) -> Result<Node, ConflictError> {
        let source_actions = match source {
            TaskOrigin::Remote if node.remote_actions.delete.is_some() => node.remote_actions.len(),
            TaskOrigin::Local if node.local_actions.delete.is_some() => node.local_actions.len(),
            _ => return Ok(node),
        };

        let path = node.path();
        let descendants = self.nodes.query_children_by_path(&path, true).await?;
        let changed: HashSet<NodeId> = descendants
            .iter()
            .filter(|n| match source {
                TaskOrigin::Remote => {
                    n.local_actions.create.is_some() || n.local_actions.move_.is_some()
                }
                TaskOrigin::Local => {
                    n.remote_actions.create.is_some() || n.remote_actions.move_.is_some()
                }
            })
            .map(|n| n.id)
            .collect();

        if changed.is_empty() && source_actions == 1 {
            debug!(path = %path, deleted_on = %source, "Directory can be removed");
            match source {
                TaskOrigin::Remote => node.local_actions = LocalActions::default(),
                TaskOrigin::Local => node.remote_actions = RemoteActions::default(),
            }
            self.nodes.update(&node).await?;
            return Ok(node);
        }

        info!(
            path = %path,
            deleted_on = %source,
            changed = changed.len(),
            "Directory removal conflicts with changes below it, recreating it"
        );

        match source {
            TaskOrigin::Remote => {
                if node.remote_actions.create.is_none() {
                    node.local_actions.create = Some(LocalCreate::new(true));
                }
                node.remote_actions.delete = None;
            }
            TaskOrigin::Local => {
                if node.local_actions.create.is_none() {
                    let mut create = RemoteCreate::new(node.remote_id.clone());
                    create.immediate = true;
                    node.remote_actions.create = Some(create);
                }
                node.local_actions.delete = None;
            }
        }
        self.nodes.update(&node).await?;

        let unchanged_children = descendants.into_iter().filter(|n| {
            !changed.contains(&n.id)
                && match source {
                    TaskOrigin::Local => {
                        node.remote_id.is_some() && n.remote_parent == node.remote_id
                    }
                    TaskOrigin::Remote => n.local_parent == Some(node.id),
                }
        });

        for mut child in unchanged_children {
            match source {
                TaskOrigin::Remote => child.remote_actions.delete = Some(RemoteDelete::new()),
                TaskOrigin::Local => child.local_actions.delete = Some(LocalDelete::new(false)),
            }
            self.nodes.update(&child).await?;
        }

        self.rename_occupant(&node).await?;
        Ok(node)
    }

    /// Moves another record sitting on the recreated directory's path aside
    async fn rename_occupant(&self, node: &Node) -> Result<(), ConflictError> {
        let path = node.path();
        let Some(mut occupant) = self.nodes.find_by_path_excluding(&path, &node.id).await? else {
            return Ok(());
        };

        let old_name = occupant.name.clone();
        let new_name = self
            .namer
            .unique_local_name(self.fs.as_ref(), &occupant.parent, &old_name)
            .await?;
        self.fs
            .rename(&path, &join_path(&occupant.parent, &new_name))
            .await?;
        info!(path = %path, new_name = %new_name, "Moved record occupying a recreated directory aside");

        occupant.name = new_name;
        if occupant.local_actions.create.is_none() && occupant.local_actions.rename.is_none() {
            occupant.local_actions.rename = Some(LocalRename::new(old_name));
        }
        self.nodes.update(&occupant).await?;
        Ok(())
    }
}
