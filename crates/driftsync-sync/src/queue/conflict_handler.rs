//! Queue-stage name collisions
//!
//! The remote side refused a create, rename or upload because a node with
//! that name already exists there. The local entry is renamed to a conflict
//! name and its record reverted; the next pass picks it up as a new entry.

use driftsync_core::domain::path::{is_in_subtree, join_path};
use driftsync_core::domain::Node;
use tracing::info;

use super::ActionQueue;
use crate::SyncError;

/// Renames local entries that collide with an existing remote name
pub struct ConflictHandler<'a> {
    queue: &'a ActionQueue,
}

impl<'a> ConflictHandler<'a> {
    pub fn new(queue: &'a ActionQueue) -> Self {
        Self { queue }
    }

    pub async fn rename_conflict_node(&self, mut node: Node) -> Result<(), SyncError> {
        let ctx = self.queue.ctx();
        let current = node.path();
        let new_name = ctx
            .namer()
            .unique_local_name(ctx.fs.as_ref(), &node.parent, &node.name)
            .await?;

        if node.directory {
            self.queue
                .remove(|task| is_in_subtree(&task.node.parent, &current))
                .await;
        }

        let target = join_path(&node.parent, &new_name);
        info!(from = %current, to = %target, "Name taken remotely, renaming local entry");
        ctx.fs.rename(&current, &target).await?;

        node.revert_local_rename_move();
        ctx.nodes.update(&node).await?;
        Ok(())
    }
}
