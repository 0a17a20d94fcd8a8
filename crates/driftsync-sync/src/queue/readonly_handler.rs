//! Read-only conflicts
//!
//! The remote side refused a change because the node, or a share above it,
//! is read-only. Local work is never thrown away: refused content is moved
//! into a `<name>-readonlyconflicts` collection next to the read-only node
//! and the original is downloaded again.
//!
//! | refused | resolution |
//! |---------|------------|
//! | upload of a read-only file | rename the local copy aside, upload it as a new file, download the original |
//! | upload / collection create below a read-only node | move into the conflict collection |
//! | delete | download the original file, or re-list the whole directory |
//! | rename / move | revert on disk and in the store |
//!
//! The conflict collection is only created locally; the next pass uploads it.

use driftsync_conflict::ConflictNamer;
use driftsync_core::domain::path::{is_in_subtree, join_path, ROOT};
use driftsync_core::domain::{Node, RemoteActions, RemoteCreate, Task};
use driftsync_core::ports::ApiErrorCode;
use tracing::{debug, info, instrument, warn};

use super::ActionQueue;
use crate::SyncError;

/// Resolves changes the remote side refused as read-only
pub struct ReadonlyHandler<'a> {
    queue: &'a ActionQueue,
}

impl<'a> ReadonlyHandler<'a> {
    pub fn new(queue: &'a ActionQueue) -> Self {
        Self { queue }
    }

    /// First node on the path from the root down to `node` that refuses writes
    ///
    /// Returns the local record of that node, if there is one.
    pub async fn find_readonly_node(&self, node: &Node) -> Result<Option<Node>, SyncError> {
        let ctx = self.queue.ctx();
        let mut current = ROOT.to_string();

        for component in node.path().split('/').filter(|c| !c.is_empty()) {
            current = join_path(&current, component);
            let attrs = match ctx.remote.get_attributes(&current).await {
                Ok(attrs) => attrs,
                // below the last existing remote node, nothing more to check
                Err(err) if err.code == ApiErrorCode::NotFound => return Ok(None),
                Err(err) => return Err(err.into()),
            };

            if attrs.blocks_writes() {
                debug!(path = %current, "Found read-only node");
                return Ok(ctx.nodes.find_by_remote_id(&attrs.id).await?);
            }
        }

        Ok(None)
    }

    #[instrument(skip_all, fields(path = %node.path()))]
    pub async fn handle_upload_conflict(&self, node: Node) -> Result<(), SyncError> {
        let Some(readonly) = self.find_readonly_node(&node).await? else {
            warn!("Upload refused, but no read-only node found");
            return Ok(());
        };

        if readonly.id == node.id {
            self.rename_local_file_download_original(node).await
        } else {
            self.move_node_to_conflict_collection(&readonly, node).await
        }
    }

    #[instrument(skip_all, fields(path = %node.path()))]
    pub async fn handle_collection_create_conflict(&self, node: Node) -> Result<(), SyncError> {
        let ctx = self.queue.ctx();
        let Some(readonly) = self.find_readonly_node(&node).await? else {
            warn!("Collection create refused, but no read-only node found");
            return Ok(());
        };

        // restored under their old names by the next pass
        for mut child in ctx.nodes.query_children_by_path(&node.path(), true).await? {
            if child.id == node.id || !child.local_actions.has_rename_or_move() {
                continue;
            }
            child.revert_local_rename_move();
            ctx.nodes.update(&child).await?;
        }

        self.move_node_to_conflict_collection(&readonly, node).await
    }

    #[instrument(skip_all, fields(path = %node.path()))]
    pub async fn handle_delete_conflict(&self, mut node: Node) -> Result<(), SyncError> {
        if !node.directory {
            return self.download_original_file(node, false).await;
        }

        let ctx = self.queue.ctx();
        info!("Delete refused, directory will be fetched again");
        ctx.nodes.delete_children(&node.id).await?;
        node.download_original = true;
        ctx.nodes.update(&node).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(path = %node.path()))]
    pub async fn handle_rename_move_conflict(&self, mut node: Node) -> Result<(), SyncError> {
        let ctx = self.queue.ctx();
        let current = node.path();
        node.revert_local_rename_move();
        node.local_actions.rename = None;
        node.local_actions.move_ = None;
        let old = node.path();

        if !ctx.fs.exists(&node.parent).await? {
            info!(path = %current, "Old parent is gone, dropping the moved entry");
            if node.directory {
                ctx.fs.remove_dir_all(&current).await?;
            } else {
                ctx.fs.unlink(&current).await?;
            }
            ctx.nodes.remove(&node.id).await?;
            return Ok(());
        }

        info!(from = %current, to = %old, "Reverting refused rename/move");
        ctx.fs.rename(&current, &old).await?;
        ctx.nodes.update(&node).await?;
        Ok(())
    }

    /// The file itself is read-only: keep the local copy under a conflict name
    async fn rename_local_file_download_original(&self, mut node: Node) -> Result<(), SyncError> {
        let ctx = self.queue.ctx();
        let original = node.clone();
        let source = node.path();
        let new_name = ctx
            .namer()
            .unique_local_name(ctx.fs.as_ref(), &node.parent, &node.name)
            .await?;

        ctx.fs.rename(&source, &join_path(&node.parent, &new_name)).await?;
        info!(from = %source, to = %new_name, "Kept local changes of a read-only file");

        node.remote_id = None;
        node.version = None;
        node.hash = None;
        node.name = new_name;
        ctx.nodes.update(&node).await?;
        self.queue.push(Task::upload(node)).await;

        self.download_original_file(original, true).await
    }

    /// Moves `node` below `<readonly>-readonlyconflicts`
    async fn move_node_to_conflict_collection(&self, readonly: &Node, node: Node) -> Result<(), SyncError> {
        let ctx = self.queue.ctx();
        let collection = self.create_conflict_collection(readonly, &node).await?;
        let name = ConflictNamer::unique_numbered(ctx.fs.as_ref(), &collection, &node.name).await?;
        let old = node.path();
        let new = join_path(&collection, &name);

        if node.directory {
            self.queue
                .remove(|task| is_in_subtree(&task.node.parent, &old))
                .await;
        }

        info!(from = %old, to = %new, "Moving refused change into conflict collection");
        ctx.fs.rename(&old, &new).await?;
        ctx.nodes.delete(&node.id).await?;

        if !node.directory && node.remote_id.is_some() {
            self.download_original_file(node, true).await?;
        }
        Ok(())
    }

    /// Creates the collection mirroring the node's parent path below the read-only node
    async fn create_conflict_collection(&self, readonly: &Node, node: &Node) -> Result<String, SyncError> {
        let mut components = vec![ConflictNamer::readonly_collection_name(&readonly.name)];
        components.extend(
            node.parent
                .split('/')
                .filter(|c| !c.is_empty())
                .skip(1)
                .map(str::to_string),
        );
        let path = format!("/{}", components.join("/"));

        self.queue.ctx().fs.create_dir_all(&path).await?;
        Ok(path)
    }

    /// Queues a download of the last synced version of `node`
    ///
    /// With `create` a new record is made (the old one was moved away),
    /// otherwise the existing record gets the remote create.
    async fn download_original_file(&self, mut node: Node, create: bool) -> Result<(), SyncError> {
        let ctx = self.queue.ctx();
        let mut action = RemoteCreate::new(node.remote_id.clone());
        action.hash = node.hash.clone();
        action.version = node.version.clone();
        action.remote_parent = node.remote_parent.clone();
        action.parent = Some(node.parent.clone());
        action.size = node.size;

        let target = if create {
            let mut fresh = Node::new(node.name.clone(), node.parent.clone(), node.directory);
            fresh.remote_parent = node.remote_parent.clone();
            fresh.remote_id = node.remote_id.clone();
            fresh.remote_actions = RemoteActions::created(action);
            ctx.nodes.create(&fresh).await?;
            fresh
        } else {
            node.remote_actions.create = Some(action);
            ctx.nodes.update(&node).await?;
            node
        };

        debug!(path = %target.path(), "Downloading original");
        self.queue.push(Task::download(target)).await;
        Ok(())
    }
}
