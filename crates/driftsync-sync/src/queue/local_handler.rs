//! Handlers for changes observed locally, applied to the remote side

use driftsync_core::domain::task::LOCAL_RESCHEDULE_PRIORITY;
use driftsync_core::domain::{Task, TaskAction, TaskOrigin};
use driftsync_core::ports::{ApiError, ApiErrorCode};
use tracing::{debug, error, info, instrument, warn};

use super::{link_parent, ActionQueue, ConflictHandler, ReadonlyHandler};
use crate::SyncError;

/// Directories become remote collections; files are queued for upload
#[instrument(skip_all, fields(path = %task.path()))]
pub(super) async fn create(queue: &ActionQueue, task: &Task) -> Result<(), SyncError> {
    if !task.node.directory {
        let upload = Task::new(TaskOrigin::Local, TaskAction::Upload, task.node.clone(), task.created);
        queue.push(upload).await;
        return Ok(());
    }

    let ctx = queue.ctx();
    let Some(mut node) = ctx.nodes.find_by_id(&task.node.id).await? else {
        debug!("Node vanished before its collection was created");
        return Ok(());
    };
    let path = node.path();

    let remote_id = match ctx.remote.create_collection(&path).await {
        Ok(id) => id,
        Err(err) => return handle_create_error(queue, node, err).await,
    };

    match ctx.fs.stat(&path).await? {
        Some(stat) => node.apply_stat(&stat),
        // renamed, moved or deleted meanwhile, the next pass sorts it out
        None => warn!("Collection vanished locally after it was created remotely"),
    }

    node.remote_id = Some(remote_id);
    link_parent(ctx, &mut node).await?;
    ctx.nodes.update(&node).await?;
    queue.count_local_action();
    Ok(())
}

async fn handle_create_error(
    queue: &ActionQueue,
    node: driftsync_core::domain::Node,
    err: ApiError,
) -> Result<(), SyncError> {
    match err.code {
        ApiErrorCode::AlreadyExists => {
            warn!(code = %err.code, "{}", err.message);
            ConflictHandler::new(queue).rename_conflict_node(node).await
        }
        _ if err.is_readonly() => {
            warn!(code = %err.code, "{}", err.message);
            ReadonlyHandler::new(queue)
                .handle_collection_create_conflict(node)
                .await
        }
        ApiErrorCode::Unauthorized => Err(err.into()),
        _ => {
            // retried by the next local delta
            error!(code = %err.code, path = %node.path(), "{}", err.message);
            Ok(())
        }
    }
}

/// Pushes a local rename and/or move to the remote node
///
/// Rename and move are applied one after the other; a failed move leaves a
/// successful rename in place.
#[instrument(skip_all, fields(path = %task.path()))]
pub(super) async fn rename_move(queue: &ActionQueue, task: &Task) -> Result<(), SyncError> {
    let ctx = queue.ctx();
    let Some(mut node) = ctx.nodes.find_by_id(&task.node.id).await? else {
        debug!("Node deleted meanwhile");
        return Ok(());
    };
    let Some(remote_id) = node.remote_id.clone() else {
        warn!("Node has no remote identity, nothing to rename");
        return Ok(());
    };

    if let Err(err) = apply_rename_move(queue, &mut node, &remote_id).await {
        return match err.code {
            ApiErrorCode::DestinationNotFound if task.priority < LOCAL_RESCHEDULE_PRIORITY => {
                info!("Destination not found, rescheduling after directory creates");
                queue
                    .push(task.clone().with_priority(LOCAL_RESCHEDULE_PRIORITY))
                    .await;
                Ok(())
            }
            ApiErrorCode::AlreadyExists => {
                warn!(code = %err.code, "{}", err.message);
                ConflictHandler::new(queue).rename_conflict_node(node).await
            }
            ApiErrorCode::ShareCantBeChildOfShare | ApiErrorCode::ReadOnlyShare | ApiErrorCode::NodeReadOnly => {
                warn!(code = %err.code, "{}", err.message);
                ReadonlyHandler::new(queue)
                    .handle_rename_move_conflict(node)
                    .await
            }
            _ => Err(err.into()),
        };
    }

    let path = node.path();
    if let Some(stat) = ctx.fs.stat(&path).await? {
        node.ctime = Some(stat.ctime);
        node.mtime = Some(stat.mtime);
    }

    link_parent(ctx, &mut node).await?;
    ctx.nodes.update(&node).await?;
    queue.count_local_action();
    Ok(())
}

async fn apply_rename_move(
    queue: &ActionQueue,
    node: &mut driftsync_core::domain::Node,
    remote_id: &str,
) -> Result<(), ApiError> {
    let remote = &queue.ctx().remote;

    if node.local_actions.rename.is_some() {
        remote.rename_node(remote_id, &node.name).await?;
        node.local_actions.rename = None;
    }
    if node.local_actions.move_.is_some() {
        remote.move_node(remote_id, &node.parent).await?;
        node.local_actions.move_ = None;
    }
    Ok(())
}

/// Deletes the remote node of a locally deleted entry
#[instrument(skip_all, fields(path = %task.path()))]
pub(super) async fn remove(queue: &ActionQueue, task: &Task) -> Result<(), SyncError> {
    let node = task.node.clone();
    let Some(remote_id) = node.remote_id.clone() else {
        // never synced, dropped by the end-of-pass cleanup
        return Ok(());
    };

    let ctx = queue.ctx();
    match ctx.remote.delete_node(&remote_id).await {
        Ok(()) => {
            ctx.nodes.delete(&node.id).await?;
            queue.count_local_action();
            Ok(())
        }
        Err(err) if err.is_readonly() => {
            warn!(code = %err.code, "{}", err.message);
            ReadonlyHandler::new(queue).handle_delete_conflict(node).await
        }
        Err(err) if err.is_unauthorized() => Err(err.into()),
        Err(err) => {
            error!(code = %err.code, "{}", err.message);
            Ok(())
        }
    }
}
