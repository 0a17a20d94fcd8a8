//! Sync pass orchestration
//!
//! One pass runs these phases strictly in order:
//!
//! ```text
//! cleanup ─► refresh ignores ─► delta (local scan ∥ remote fetch, apply)
//!    ─► replay queue errors ─► push directory actions ─► push file actions
//!    ─► push removals ─► drain queues ─► persist cursor ─► cleanup
//! ```
//!
//! A stop request is checked between phases; once set, the remaining phases
//! are skipped and the cursor is not persisted, so the next pass sees the same
//! remote changes again.
//!
//! ## Design Notes
//!
//! - Actions never outlive a pass. Cleanup clears them at both ends; whatever
//!   failed is kept as a queue error and replayed at the start of the next
//!   pass.
//! - The directory walk resolves removal conflicts while it pushes, so a
//!   directory's children are listed only after its own conflicts were
//!   settled.
//! - The walks report failures through the visitor; the typed error is kept
//!   there and returned once the walk unwound.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use driftsync_conflict::RemovalConflicts;
use driftsync_core::domain::{
    LocalCreate, LocalDelete, Node, QueueError, RemoteCreate, RemoteDelete, Task, TaskAction,
    TaskOrigin,
};
use driftsync_core::ports::{NodeVisitor, WalkOptions};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::context::SyncContext;
use crate::delta::run_delta;
use crate::events::SyncEvent;
use crate::garbage_collector::GarbageCollector;
use crate::queue::{ActionQueue, QueueSummary};
use crate::selective::SelectiveSync;
use crate::SyncError;

/// Outcome of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub uploaded: u64,
    pub downloaded: u64,
    /// Local changes applied to the remote
    pub local_actions: u64,
    /// Remote changes applied to the local tree
    pub remote_actions: u64,
    pub queued_errors: u64,
    /// The pass ended early on a stop request
    pub stopped: bool,
    pub duration_ms: u64,
}

impl SyncReport {
    fn from_summary(summary: QueueSummary) -> Self {
        Self {
            uploaded: summary.uploaded,
            downloaded: summary.downloaded,
            local_actions: summary.local_actions,
            remote_actions: summary.remote_actions,
            queued_errors: summary.queued_errors,
            ..Self::default()
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Runs sync passes against one instance
///
/// Passes must not overlap; the engine does not guard against a second
/// concurrent `run` on the same instance.
pub struct SyncEngine {
    ctx: SyncContext,
    stop_requested: AtomicBool,
    /// Queue of the pass in progress, so `stop` can reach it
    queue: Mutex<Option<ActionQueue>>,
}

impl SyncEngine {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            stop_requested: AtomicBool::new(false),
            queue: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Asks the running pass to finish early
    ///
    /// Queued tasks that have not started are dropped; running ones finish.
    pub async fn stop(&self, force_quit: bool) {
        info!(force_quit, "Stopping sync");
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(queue) = self.queue.lock().await.as_ref() {
            queue.stop().await;
        }
        self.ctx.events.emit(SyncEvent::Stopped { force_quit });
    }

    fn is_stopped(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Runs one complete pass
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        self.stop_requested.store(false, Ordering::SeqCst);

        let mut report = self.run_phases().await?;
        report.stopped = self.is_stopped();
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            uploaded = report.uploaded,
            downloaded = report.downloaded,
            local_actions = report.local_actions,
            remote_actions = report.remote_actions,
            queued_errors = report.queued_errors,
            stopped = report.stopped,
            duration_ms = report.duration_ms,
            "Sync pass finished"
        );
        Ok(report)
    }

    async fn run_phases(&self) -> Result<SyncReport, SyncError> {
        self.cleanup().await?;
        if self.is_stopped() {
            return Ok(SyncReport::default());
        }

        SelectiveSync::new(&self.ctx).update_ignore_db().await?;
        let cursor = run_delta(&self.ctx).await?;
        if self.is_stopped() {
            return self.finish(SyncReport::default()).await;
        }

        self.apply_queue_errors().await?;
        if self.is_stopped() {
            return self.finish(SyncReport::default()).await;
        }

        let summary = self.apply_actions().await?;
        let report = SyncReport::from_summary(summary);

        if !self.is_stopped() {
            if let Some(cursor) = cursor {
                self.ctx.cursor.set(&cursor).await?;
                debug!("Cursor persisted");
            }
        }
        self.finish(report).await
    }

    async fn finish(&self, report: SyncReport) -> Result<SyncReport, SyncError> {
        self.clean_database().await?;
        Ok(report)
    }

    /// Clears transient records, actions and stale transfer state
    pub async fn cleanup(&self) -> Result<(), SyncError> {
        self.clean_database().await?;
        GarbageCollector::new(&self.ctx).run().await?;
        Ok(())
    }

    /// Drops records that never got a remote identity or lost their local
    /// entry, then clears all action flags
    pub async fn clean_database(&self) -> Result<(), SyncError> {
        let purged = self.ctx.nodes.purge_transient().await?;
        let cleared = self.ctx.nodes.clear_actions().await?;
        debug!(purged, cleared, "Database cleaned");
        Ok(())
    }

    // ========================================================================
    // Action phase
    // ========================================================================

    async fn apply_actions(&self) -> Result<QueueSummary, SyncError> {
        let queue = ActionQueue::new(self.ctx.clone());
        *self.queue.lock().await = Some(queue.clone());
        self.ctx.events.emit(SyncEvent::TransferStart);

        let result = self.push_and_process(&queue).await;

        self.ctx.events.emit(SyncEvent::TransferEnd);
        *self.queue.lock().await = None;
        result
    }

    async fn push_and_process(&self, queue: &ActionQueue) -> Result<QueueSummary, SyncError> {
        self.push_directory_actions(queue).await?;
        if !self.is_stopped() {
            self.push_file_actions(queue).await?;
        }
        if !self.is_stopped() {
            self.push_removals(queue).await?;
        }
        if self.is_stopped() {
            queue.stop().await;
            return Ok(queue.summary());
        }
        queue.process().await
    }

    async fn push_directory_actions(&self, queue: &ActionQueue) -> Result<(), SyncError> {
        let mut pass = DirectoryPass {
            queue,
            removals: RemovalConflicts::new(
                self.ctx.nodes.clone(),
                self.ctx.fs.clone(),
                self.ctx.namer(),
            ),
            failure: None,
        };
        let walked = self
            .ctx
            .nodes
            .walk_tree(None, WalkOptions::directories(), &mut pass)
            .await;
        finish_walk(walked, pass.failure)
    }

    async fn push_file_actions(&self, queue: &ActionQueue) -> Result<(), SyncError> {
        for node in self.ctx.nodes.files_with_actions().await? {
            validate(&node)?;
            push_actions(queue, &node).await;
        }
        Ok(())
    }

    async fn push_removals(&self, queue: &ActionQueue) -> Result<(), SyncError> {
        let mut pass = RemovalPass { queue };
        let walked = self
            .ctx
            .nodes
            .walk_tree(None, WalkOptions::removals(), &mut pass)
            .await;
        finish_walk(walked, None)
    }

    // ========================================================================
    // Queue error replay
    // ========================================================================

    /// Turns the errors of earlier passes back into actions
    ///
    /// Actions are only restored into empty slots; whatever the delta found
    /// this pass takes precedence.
    #[instrument(skip(self))]
    pub async fn apply_queue_errors(&self) -> Result<(), SyncError> {
        let mut errors = self.ctx.queue_errors.all().await?;
        if errors.is_empty() {
            return Ok(());
        }
        errors.sort_by_key(|e| e.task.created);
        info!(count = errors.len(), "Replaying queue errors");

        let now = Utc::now();
        for error in errors {
            if error.is_expired(now) {
                debug!(path = %error.task.path(), "Dropping expired queue error");
            } else {
                self.apply_queue_error(&error).await?;
            }
            self.ctx.queue_errors.remove(&error.id).await?;
        }
        Ok(())
    }

    async fn apply_queue_error(&self, error: &QueueError) -> Result<(), SyncError> {
        let nodes = &self.ctx.nodes;
        let task = &error.task;
        let origin = error.origin;

        match task.action {
            TaskAction::Remove => {
                let Some(mut node) = nodes.find_by_id(&task.node.id).await? else {
                    return Ok(());
                };
                match origin {
                    TaskOrigin::Local if node.local_actions.delete.is_none() => {
                        node.local_actions.delete = Some(LocalDelete::new(task.immediate));
                    }
                    TaskOrigin::Remote if node.remote_actions.delete.is_none() => {
                        node.remote_actions.delete = Some(RemoteDelete::new());
                    }
                    _ => return Ok(()),
                }
                nodes.update(&node).await?;
            }

            TaskAction::RenameMove => {
                let Some(mut node) = nodes.find_by_id(&task.node.id).await? else {
                    return Ok(());
                };
                match origin {
                    TaskOrigin::Local => {
                        let stored = &task.node.local_actions;
                        let actions = &mut node.local_actions;
                        if actions.rename.is_none() {
                            actions.rename = stored.rename.clone();
                        }
                        if actions.move_.is_none() {
                            actions.move_ = stored.move_.clone();
                        }
                    }
                    TaskOrigin::Remote => {
                        let stored = &task.node.remote_actions;
                        let actions = &mut node.remote_actions;
                        if actions.rename.is_none() {
                            actions.rename = stored.rename.clone();
                        }
                        if actions.move_.is_none() {
                            actions.move_ = stored.move_.clone();
                        }
                    }
                }
                nodes.update(&node).await?;
            }

            TaskAction::Create | TaskAction::Upload | TaskAction::Download => {
                match nodes.find_by_path(&task.path()).await? {
                    Some(mut node) => {
                        add_create(&mut node, task, origin);
                        nodes.update(&node).await?;
                    }
                    None if origin == TaskOrigin::Local => {
                        debug!(path = %task.path(), "Source of the failed change is gone");
                    }
                    None => self.restore_remote_create(task).await?,
                }
            }
        }
        Ok(())
    }

    /// Re-adds a failed remote create whose local path has no record
    async fn restore_remote_create(&self, task: &Task) -> Result<(), SyncError> {
        let nodes = &self.ctx.nodes;
        let remote_id = task.node.remote_id.clone().or_else(|| {
            task.node
                .remote_actions
                .create
                .as_ref()
                .and_then(|c| c.remote_id.clone())
        });

        let existing = match &remote_id {
            Some(id) => nodes.find_by_remote_id(id).await?,
            None => None,
        };
        match existing {
            Some(mut node) => {
                add_create(&mut node, task, TaskOrigin::Remote);
                nodes.update(&node).await?;
            }
            None => {
                let mut node = task.node.clone();
                if node.remote_actions.create.is_none() {
                    node.remote_actions.create = Some(RemoteCreate::new(remote_id));
                }
                if nodes.find_by_id(&node.id).await?.is_some() {
                    nodes.update(&node).await?;
                } else {
                    nodes.create(&node).await?;
                }
            }
        }
        Ok(())
    }
}

fn add_create(node: &mut Node, task: &Task, origin: TaskOrigin) {
    match origin {
        TaskOrigin::Local if node.local_actions.create.is_none() => {
            node.local_actions.create = Some(LocalCreate::new(task.immediate));
        }
        TaskOrigin::Remote if node.remote_actions.create.is_none() => {
            node.remote_actions.create = Some(
                task.node
                    .remote_actions
                    .create
                    .clone()
                    .unwrap_or_else(|| RemoteCreate::new(node.remote_id.clone())),
            );
        }
        _ => {}
    }
}

// ============================================================================
// Pushing
// ============================================================================

fn validate(node: &Node) -> Result<(), SyncError> {
    node.local_actions
        .validate()
        .map_err(|reason| SyncError::InvalidActions {
            path: node.path(),
            reason: reason.to_string(),
        })
}

/// Pushes the create and rename/move tasks of `node`; deletes go in the removal walk
async fn push_actions(queue: &ActionQueue, node: &Node) {
    if let Some(create) = &node.remote_actions.create {
        let task = Task::new(TaskOrigin::Remote, TaskAction::Create, node.clone(), create.initialized)
            .with_immediate(create.immediate);
        queue.push(task).await;
    }
    if let Some(initialized) = node.remote_actions.rename_move_initialized() {
        queue
            .push(Task::new(TaskOrigin::Remote, TaskAction::RenameMove, node.clone(), initialized))
            .await;
    }
    if let Some(initialized) = node.local_actions.rename_move_initialized() {
        queue
            .push(Task::new(TaskOrigin::Local, TaskAction::RenameMove, node.clone(), initialized))
            .await;
    }
    if let Some(create) = &node.local_actions.create {
        let task = Task::new(TaskOrigin::Local, TaskAction::Create, node.clone(), create.initialized)
            .with_immediate(create.immediate);
        queue.push(task).await;
    }
}

fn finish_walk(walked: anyhow::Result<()>, failure: Option<SyncError>) -> Result<(), SyncError> {
    match (walked, failure) {
        (_, Some(err)) => Err(err),
        (Err(err), None) => Err(err.into()),
        (Ok(()), None) => Ok(()),
    }
}

/// Directory walk: validates, resolves removal conflicts and pushes
struct DirectoryPass<'a> {
    queue: &'a ActionQueue,
    removals: RemovalConflicts,
    failure: Option<SyncError>,
}

impl DirectoryPass<'_> {
    async fn handle(&self, node: Node) -> Result<(), SyncError> {
        validate(&node)?;
        let node = self.removals.resolve(node).await?;
        push_actions(self.queue, &node).await;
        Ok(())
    }
}

#[async_trait]
impl NodeVisitor for DirectoryPass<'_> {
    async fn visit(&mut self, node: Node, _parent: Option<&Node>) -> anyhow::Result<()> {
        if !node.has_actions() {
            return Ok(());
        }
        let path = node.path();
        if let Err(err) = self.handle(node).await {
            warn!(path = %path, error = %err, "Directory walk aborted");
            self.failure = Some(err);
            anyhow::bail!("directory walk aborted at {path}");
        }
        Ok(())
    }
}

/// Removal walk: pushes deletes, not descending below deleted directories
struct RemovalPass<'a> {
    queue: &'a ActionQueue,
}

#[async_trait]
impl NodeVisitor for RemovalPass<'_> {
    async fn visit(&mut self, node: Node, _parent: Option<&Node>) -> anyhow::Result<()> {
        if let Some(delete) = &node.remote_actions.delete {
            let task = Task::new(TaskOrigin::Remote, TaskAction::Remove, node.clone(), delete.initialized);
            self.queue.push(task).await;
        }
        if let Some(delete) = &node.local_actions.delete {
            let task = Task::new(TaskOrigin::Local, TaskAction::Remove, node.clone(), delete.initialized)
                .with_immediate(delete.immediate);
            self.queue.push(task).await;
        }
        Ok(())
    }
}
