//! Handlers for changes observed remotely, applied to the local tree

use driftsync_core::domain::path::ROOT;
use driftsync_core::domain::task::REMOTE_RESCHEDULE_PRIORITY;
use driftsync_core::domain::{Node, Task, TaskAction, TaskOrigin, REMOTE_ROOT};
use driftsync_core::ports::{ApiError, ApiErrorCode};
use tracing::{debug, info, instrument};

use super::{link_parent, ActionQueue};
use crate::SyncError;

/// Directories are created locally (merging into an existing one); files are
/// queued for download
#[instrument(skip_all, fields(path = %task.path()))]
pub(super) async fn create(queue: &ActionQueue, task: &Task) -> Result<(), SyncError> {
    if !task.node.directory {
        let download = Task::new(TaskOrigin::Remote, TaskAction::Download, task.node.clone(), task.created);
        queue.push(download).await;
        return Ok(());
    }

    let ctx = queue.ctx();
    let Some(mut node) = ctx.nodes.find_by_id(&task.node.id).await? else {
        debug!("Node vanished before its directory was created");
        return Ok(());
    };
    let path = node.path();

    if !ctx.fs.create_dir(&path).await? {
        debug!("Directory exists already, merging");
    }
    let stat = ctx
        .fs
        .stat(&path)
        .await?
        .ok_or_else(|| anyhow::anyhow!("{path} vanished right after it was created"))?;

    node.ino = Some(stat.ino);
    node.apply_stat(&stat);
    if let Some(create) = &node.remote_actions.create {
        node.remote_id = create.remote_id.clone();
    }
    link_parent(ctx, &mut node).await?;
    ctx.nodes.update(&node).await?;
    queue.count_remote_action();
    Ok(())
}

/// Where a remote move puts the node
enum Destination {
    Unchanged,
    Root,
    Below(Node),
}

/// Applies a remote rename and/or move to the local entry
///
/// The new parent is looked up by remote id. If it has no record yet, the
/// task is rescheduled once behind the directory creates.
#[instrument(skip_all, fields(path = %task.path()))]
pub(super) async fn rename_move(queue: &ActionQueue, task: &Task) -> Result<(), SyncError> {
    let ctx = queue.ctx();
    let Some(mut node) = ctx.nodes.find_by_id(&task.node.id).await? else {
        debug!("Node deleted meanwhile");
        return Ok(());
    };

    let new_name = node
        .remote_actions
        .rename
        .as_ref()
        .map(|r| r.remote_name.clone())
        .unwrap_or_else(|| node.name.clone());

    let destination = match &node.remote_actions.move_ {
        None => Destination::Unchanged,
        Some(moved) if moved.remote_parent == REMOTE_ROOT => Destination::Root,
        Some(moved) => match ctx.nodes.find_by_remote_id(&moved.remote_parent).await? {
            Some(parent) => Destination::Below(parent),
            None if task.priority == REMOTE_RESCHEDULE_PRIORITY => {
                return Err(ApiError::new(
                    ApiErrorCode::DestinationNotFound,
                    format!("parent {} of '{new_name}' is unknown", moved.remote_parent),
                )
                .into());
            }
            None => {
                info!("New parent not known yet, rescheduling after directory creates");
                queue
                    .push(task.clone().with_priority(REMOTE_RESCHEDULE_PRIORITY))
                    .await;
                return Ok(());
            }
        },
    };

    let old_path = node.path();
    node.name = new_name;
    match destination {
        Destination::Unchanged => {}
        Destination::Root => {
            node.parent = ROOT.to_string();
            node.attach_to_root();
        }
        Destination::Below(parent) => {
            node.parent = parent.path();
            node.attach_to(&parent);
        }
    }
    let new_path = node.path();

    ctx.fs.rename(&old_path, &new_path).await?;
    if let Some(stat) = ctx.fs.stat(&new_path).await? {
        node.mtime = Some(stat.mtime);
    }

    ctx.nodes.update(&node).await?;
    queue.count_remote_action();
    Ok(())
}

/// Deletes the local entry of a remotely deleted node
#[instrument(skip_all, fields(path = %task.path()))]
pub(super) async fn remove(queue: &ActionQueue, task: &Task) -> Result<(), SyncError> {
    let ctx = queue.ctx();
    let Some(node) = ctx.nodes.find_by_id(&task.node.id).await? else {
        debug!("Node removed meanwhile");
        return Ok(());
    };
    let path = node.path();

    if ctx.fs.exists(&path).await? {
        if node.directory {
            ctx.fs.remove_dir_all(&path).await?;
        } else {
            ctx.fs.unlink(&path).await?;
        }
    } else {
        debug!("Entry is gone already");
    }

    ctx.nodes.delete(&node.id).await?;
    queue.count_remote_action();
    Ok(())
}
