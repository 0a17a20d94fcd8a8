//! Content transfers
//!
//! Downloads land in the instance temp directory first and are moved into
//! the tree once complete. Uploads are sent in fixed-size chunks.
//!
//! Both directions keep a [`TransferRecord`] so a transfer interrupted by a
//! crash or a failed pass resumes instead of starting over:
//! - downloads are keyed by `<remote id>-<version>` and resume at the size of
//!   the temp file;
//! - uploads are keyed by node id and resume after the last stored chunk of
//!   the same chunk group.

use driftsync_core::domain::{Node, Task, TransferRecord, TransferState};
use driftsync_core::ports::{ApiError, ApiErrorCode, UploadChunk, UploadedFile};
use tracing::{debug, info, instrument, warn};

use super::{link_parent, ActionQueue, ConflictHandler, ReadonlyHandler};
use crate::events::SyncEvent;
use crate::SyncError;

const DOWNLOAD: &str = "download";
const UPLOAD: &str = "upload";

// ============================================================================
// Download
// ============================================================================

#[instrument(skip_all, fields(path = %task.path()))]
pub(super) async fn download(queue: &ActionQueue, task: &Task) -> Result<(), SyncError> {
    let ctx = queue.ctx();
    let Some(mut node) = ctx.nodes.find_by_id(&task.node.id).await? else {
        debug!("Node removed before its download started");
        return Ok(());
    };
    let Some(create) = node.remote_actions.create.clone() else {
        warn!("Download queued without a remote create");
        return Ok(());
    };
    let Some(remote_id) = create.remote_id.clone() else {
        warn!("Remote create carries no remote id");
        return Ok(());
    };

    let transfer_id = format!("{remote_id}-{}", create.version.as_deref().unwrap_or_default());
    let (record, offset) = resume_download(queue, &transfer_id).await?;
    let temp_name = record.temp_name().unwrap_or_default().to_string();
    let temp_path = ctx.settings.temp_dir.join(&temp_name);

    let written = match ctx
        .remote
        .download_file(&remote_id, create.version.as_deref(), offset, &temp_path)
        .await
    {
        Ok(written) => written,
        Err(err) => return download_failed(err),
    };

    let path = node.path();
    let transferred = offset + written;
    ctx.events.emit(SyncEvent::TransferProgress {
        node_id: node.id,
        path: path.clone(),
        transferred,
        total: create.size.unwrap_or(transferred),
    });

    ctx.fs.adopt_file(&temp_path, &path).await?;
    ctx.transfers.remove(&transfer_id, DOWNLOAD).await?;

    let stat = ctx
        .fs
        .stat(&path)
        .await?
        .ok_or_else(|| anyhow::anyhow!("{path} vanished right after the download"))?;

    node.ino = Some(stat.ino);
    node.apply_stat(&stat);
    node.remote_id = Some(remote_id);
    node.hash = create.hash.clone();
    node.version = create.version.clone();
    link_parent(ctx, &mut node).await?;
    node.remote_actions.create = None;
    ctx.nodes.update(&node).await?;

    info!(bytes = transferred, "Downloaded");
    queue.count_download();
    Ok(())
}

/// Returns the record to use and the offset to continue at
async fn resume_download(
    queue: &ActionQueue,
    transfer_id: &str,
) -> Result<(TransferRecord, u64), SyncError> {
    let ctx = queue.ctx();
    tokio::fs::create_dir_all(&ctx.settings.temp_dir).await?;

    if let Some(record) = ctx.transfers.find(transfer_id, DOWNLOAD).await? {
        if let Some(temp) = record.temp_name().map(|n| ctx.settings.temp_dir.join(n)) {
            if let Ok(meta) = tokio::fs::metadata(&temp).await {
                debug!(offset = meta.len(), "Resuming download");
                return Ok((record, meta.len()));
            }
        }
    }

    let record = TransferRecord::download(transfer_id);
    ctx.transfers.save(&record).await?;
    Ok((record, 0))
}

fn download_failed(err: ApiError) -> Result<(), SyncError> {
    match err.code {
        ApiErrorCode::DownloadAborted => {
            info!(code = %err.code, "{}", err.message);
            Ok(())
        }
        _ => Err(err.into()),
    }
}

// ============================================================================
// Upload
// ============================================================================

#[instrument(skip_all, fields(path = %task.path()))]
pub(super) async fn upload(queue: &ActionQueue, task: &Task) -> Result<(), SyncError> {
    let ctx = queue.ctx();
    let Some(mut node) = ctx.nodes.find_by_id(&task.node.id).await? else {
        debug!("Node removed before its upload started");
        return Ok(());
    };
    let path = node.path();

    let Some(stat) = ctx.fs.stat(&path).await? else {
        info!("Source vanished before the upload");
        return Ok(());
    };

    let uploaded = match send_chunks(queue, &node, stat.size).await? {
        Ok(uploaded) => uploaded,
        Err(err) => return upload_failed(queue, node, err).await,
    };

    let uploaded = match uploaded {
        Some(uploaded) => uploaded,
        None => match ctx.remote.get_attributes(&path).await {
            Ok(attrs) => UploadedFile {
                remote_id: attrs.id,
                version: attrs.version.unwrap_or_default(),
                hash: attrs.hash.unwrap_or_default(),
            },
            Err(err) if err.is_unauthorized() => return Err(err.into()),
            Err(err) => {
                warn!(code = %err.code, "Uploaded, but attributes could not be read: {}", err.message);
                return Ok(());
            }
        },
    };

    node.remote_id = Some(uploaded.remote_id);
    node.version = Some(uploaded.version);
    node.hash = Some(uploaded.hash);
    if let Some(stat) = ctx.fs.stat(&path).await? {
        node.ino = Some(stat.ino);
        node.apply_stat(&stat);
    }
    link_parent(ctx, &mut node).await?;
    node.local_actions.create = None;
    ctx.nodes.update(&node).await?;
    ctx.transfers.remove(&node.id.to_string(), UPLOAD).await?;

    info!(bytes = stat.size, "Uploaded");
    queue.count_upload();
    Ok(())
}

/// Sends the outstanding chunks
///
/// The outer result carries local failures, the inner one the remote's answer.
async fn send_chunks(
    queue: &ActionQueue,
    node: &Node,
    total_size: u64,
) -> Result<Result<Option<UploadedFile>, ApiError>, SyncError> {
    let ctx = queue.ctx();
    let path = node.path();
    let transfer_id = node.id.to_string();
    let chunk_size = ctx.settings.chunk_size.max(1) as u64;
    let total_chunks = total_size.div_ceil(chunk_size).max(1);

    let mut record = match ctx.transfers.find(&transfer_id, UPLOAD).await? {
        Some(record) => record,
        None => {
            let record = TransferRecord::upload(&transfer_id);
            ctx.transfers.save(&record).await?;
            record
        }
    };
    let (chunk_group, mut complete) = match &record.state {
        TransferState::Upload {
            chunk_group,
            chunks_complete,
        } => (chunk_group.clone(), *chunks_complete),
        TransferState::Download { .. } => (uuid::Uuid::new_v4().to_string(), 0),
    };
    if complete > 0 {
        debug!(chunks_complete = complete, total_chunks, "Resuming upload");
    }

    let mut result = None;
    while complete < total_chunks {
        let data = ctx
            .fs
            .read_chunk(&path, complete * chunk_size, chunk_size as usize)
            .await?;
        let chunk = UploadChunk {
            path: path.clone(),
            remote_id: node.remote_id.clone(),
            chunk_group: chunk_group.clone(),
            index: complete,
            total_chunks,
            total_size,
            data,
        };

        match ctx.remote.upload_chunk(chunk).await {
            Ok(done) => result = done,
            Err(err) => return Ok(Err(err)),
        }

        complete += 1;
        record.state = TransferState::Upload {
            chunk_group: chunk_group.clone(),
            chunks_complete: complete,
        };
        ctx.transfers.save(&record).await?;
        ctx.events.emit(SyncEvent::TransferProgress {
            node_id: node.id,
            path: path.clone(),
            transferred: (complete * chunk_size).min(total_size),
            total: total_size,
        });
    }

    Ok(Ok(result))
}

async fn upload_failed(queue: &ActionQueue, node: Node, err: ApiError) -> Result<(), SyncError> {
    match err.code {
        ApiErrorCode::UploadAborted | ApiErrorCode::SourceNotFound => {
            info!(code = %err.code, "{}", err.message);
            Ok(())
        }
        ApiErrorCode::AlreadyExists => {
            warn!(code = %err.code, "{}", err.message);
            ConflictHandler::new(queue).rename_conflict_node(node).await
        }
        _ if err.is_readonly() => {
            info!(code = %err.code, "{}", err.message);
            ReadonlyHandler::new(queue).handle_upload_conflict(node).await
        }
        _ => Err(err.into()),
    }
}

