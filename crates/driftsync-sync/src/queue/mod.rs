//! Action queue
//!
//! Executes the tasks of one sync pass. Metadata tasks (create, rename/move,
//! remove) run from a priority heap; file content moves through a separate
//! FIFO transfer queue with its own concurrency limit.
//!
//! ```text
//!  push()                      process()
//!    │      ┌──────────────┐      │
//!    ├────► │ action heap  │ ─────┼──► local / remote handlers ──┐
//!    │      └──────────────┘      │                              │ file create
//!    │      ┌──────────────┐      │                              ▼
//!    └────► │ transfer FIFO│ ─────┴──► upload / download ◄── push_transfer()
//!           └──────────────┘
//! ```
//!
//! ## Design Notes
//!
//! - Nothing runs before [`ActionQueue::process`]; the engine pushes every
//!   task of a pass first.
//! - Lower priority values run first; equal priorities keep push order.
//! - A handler error other than `Unauthorized` is stored as a queue error and
//!   replayed next pass. `Unauthorized` stops both queues and fails the pass.
//! - [`ActionQueue::stop`] drops everything not yet started; running tasks
//!   finish.

mod conflict_handler;
mod local_handler;
mod readonly_handler;
mod remote_handler;
mod transfer;

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use driftsync_core::domain::{QueueError, Task, TaskAction, TaskOrigin};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::SyncContext;
use crate::SyncError;

pub use conflict_handler::ConflictHandler;
pub use readonly_handler::ReadonlyHandler;

// ============================================================================
// Statistics
// ============================================================================

/// Counters of one queue run
#[derive(Debug, Default)]
pub struct QueueStats {
    uploaded: AtomicU64,
    downloaded: AtomicU64,
    local_actions: AtomicU64,
    remote_actions: AtomicU64,
    queued_errors: AtomicU64,
}

/// Snapshot of [`QueueStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub uploaded: u64,
    pub downloaded: u64,
    pub local_actions: u64,
    pub remote_actions: u64,
    pub queued_errors: u64,
}

impl QueueStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self) -> QueueSummary {
        QueueSummary {
            uploaded: self.uploaded.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            local_actions: self.local_actions.load(Ordering::Relaxed),
            remote_actions: self.remote_actions.load(Ordering::Relaxed),
            queued_errors: self.queued_errors.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Heap entry
// ============================================================================

struct Queued {
    key: Reverse<(u8, u64)>,
    task: Task,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.key.cmp(&other.key)
    }
}

// ============================================================================
// ActionQueue
// ============================================================================

struct Shared {
    ctx: SyncContext,
    actions: Mutex<BinaryHeap<Queued>>,
    transfers: Mutex<VecDeque<Task>>,
    sequence: AtomicU64,
    cancel: CancellationToken,
    stats: QueueStats,
}

/// Two-level task queue of one sync pass
///
/// Cloning yields another handle to the same queue; handlers use one to
/// reschedule tasks and queue transfers.
#[derive(Clone)]
pub struct ActionQueue {
    shared: Arc<Shared>,
}

impl ActionQueue {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            shared: Arc::new(Shared {
                ctx,
                actions: Mutex::new(BinaryHeap::new()),
                transfers: Mutex::new(VecDeque::new()),
                sequence: AtomicU64::new(0),
                cancel: CancellationToken::new(),
                stats: QueueStats::default(),
            }),
        }
    }

    pub(crate) fn ctx(&self) -> &SyncContext {
        &self.shared.ctx
    }

    /// Queues a task; transfers go to the transfer queue
    pub async fn push(&self, task: Task) {
        if self.shared.cancel.is_cancelled() {
            debug!(path = %task.path(), "Queue stopped, dropping task");
            return;
        }
        if task.action.is_transfer() {
            self.shared.transfers.lock().await.push_back(task);
            return;
        }

        let seq = self.shared.sequence.fetch_add(1, Ordering::Relaxed);
        debug!(
            origin = %task.origin,
            action = %task.action,
            priority = task.priority,
            path = %task.path(),
            "Queued task"
        );
        self.shared.actions.lock().await.push(Queued {
            key: Reverse((task.priority, seq)),
            task,
        });
    }

    /// Drops queued tasks (both queues) matching `predicate`
    pub async fn remove<F>(&self, predicate: F)
    where
        F: Fn(&Task) -> bool,
    {
        self.shared
            .actions
            .lock()
            .await
            .retain(|queued| !predicate(&queued.task));
        self.shared.transfers.lock().await.retain(|task| !predicate(task));
    }

    /// Queued tasks not yet started
    pub async fn len(&self) -> usize {
        self.shared.actions.lock().await.len() + self.shared.transfers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stops both queues: pending tasks are dropped, running ones finish
    pub async fn stop(&self) {
        info!("Stopping action queue");
        self.shared.cancel.cancel();
        self.clear().await;
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn summary(&self) -> QueueSummary {
        self.shared.stats.summary()
    }

    async fn clear(&self) {
        self.shared.actions.lock().await.clear();
        self.shared.transfers.lock().await.clear();
    }

    async fn pop_action(&self) -> Option<Task> {
        self.shared.actions.lock().await.pop().map(|q| q.task)
    }

    async fn pop_transfer(&self) -> Option<Task> {
        self.shared.transfers.lock().await.pop_front()
    }

    /// Runs queued tasks until both queues are drained or stopped
    ///
    /// Fails only with a fatal handler error; every other failure was stored
    /// as a queue error.
    pub async fn process(&self) -> Result<QueueSummary, SyncError> {
        let settings = &self.shared.ctx.settings;
        let action_limit = settings.action_concurrency.max(1);
        let transfer_limit = settings.max_concurrent_connections.max(1);

        let mut actions: JoinSet<Result<(), SyncError>> = JoinSet::new();
        let mut transfers: JoinSet<Result<(), SyncError>> = JoinSet::new();
        let mut fatal: Option<SyncError> = None;

        let pending = self.len().await;
        info!(pending, "Processing action queue");

        loop {
            if !self.is_stopped() {
                while actions.len() < action_limit {
                    let Some(task) = self.pop_action().await else { break };
                    actions.spawn(self.clone().run(task));
                }
                while transfers.len() < transfer_limit {
                    let Some(task) = self.pop_transfer().await else { break };
                    transfers.spawn(self.clone().run(task));
                }
            }

            if actions.is_empty() && transfers.is_empty() {
                break;
            }

            let joined = tokio::select! {
                Some(joined) = actions.join_next(), if !actions.is_empty() => joined,
                Some(joined) = transfers.join_next(), if !transfers.is_empty() => joined,
                else => break,
            };

            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(error = %err, "Fatal queue error, stopping");
                    fatal.get_or_insert(err);
                    self.stop().await;
                }
                Err(join_err) => {
                    error!(error = %join_err, "Queue worker panicked");
                }
            }
        }

        let summary = self.summary();
        info!(?summary, "Action queue finished");
        match fatal {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    /// Runs one task; non-fatal failures become queue errors
    async fn run(self, task: Task) -> Result<(), SyncError> {
        let result = match (task.origin, task.action) {
            (_, TaskAction::Upload) => transfer::upload(&self, &task).await,
            (_, TaskAction::Download) => transfer::download(&self, &task).await,
            (TaskOrigin::Local, TaskAction::Create) => local_handler::create(&self, &task).await,
            (TaskOrigin::Local, TaskAction::RenameMove) => {
                local_handler::rename_move(&self, &task).await
            }
            (TaskOrigin::Local, TaskAction::Remove) => local_handler::remove(&self, &task).await,
            (TaskOrigin::Remote, TaskAction::Create) => remote_handler::create(&self, &task).await,
            (TaskOrigin::Remote, TaskAction::RenameMove) => {
                remote_handler::rename_move(&self, &task).await
            }
            (TaskOrigin::Remote, TaskAction::Remove) => remote_handler::remove(&self, &task).await,
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_unauthorized() => Err(err),
            Err(err) => {
                self.record_error(&task, &err).await?;
                Ok(())
            }
        }
    }

    /// Stores a failed task for replay in the next pass
    pub(crate) async fn record_error(&self, task: &Task, err: &SyncError) -> Result<(), SyncError> {
        let path = task.path();
        warn!(
            origin = %task.origin,
            action = %task.action,
            path = %path,
            error = %err,
            "Task failed, storing it for the next pass"
        );
        let entry = QueueError::new(task.origin, task.clone(), err.code(), format!("{err} for '{path}'"));
        self.shared.ctx.queue_errors.insert(&entry).await?;
        QueueStats::bump(&self.shared.stats.queued_errors);
        Ok(())
    }

    pub(crate) fn count_upload(&self) {
        QueueStats::bump(&self.shared.stats.uploaded);
    }

    pub(crate) fn count_download(&self) {
        QueueStats::bump(&self.shared.stats.downloaded);
    }

    pub(crate) fn count_local_action(&self) {
        QueueStats::bump(&self.shared.stats.local_actions);
    }

    pub(crate) fn count_remote_action(&self) {
        QueueStats::bump(&self.shared.stats.remote_actions);
    }
}

// ============================================================================
// Shared helpers for handlers
// ============================================================================

/// Re-derives `local_parent` / `remote_parent` from the node's current parent path
pub(crate) async fn link_parent(
    ctx: &SyncContext,
    node: &mut driftsync_core::domain::Node,
) -> Result<(), SyncError> {
    if node.is_root_child() {
        node.attach_to_root();
        return Ok(());
    }
    match ctx.nodes.find_by_path(&node.parent).await? {
        Some(parent) => node.attach_to(&parent),
        None => warn!(path = %node.path(), "No record for the parent directory"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_core::domain::Node;

    fn queued(priority: u8, seq: u64) -> Queued {
        let node = Node::new(format!("{priority}-{seq}"), "/", false);
        let task = Task::new(TaskOrigin::Local, TaskAction::Create, node, chrono::Utc::now())
            .with_priority(priority);
        Queued {
            key: Reverse((priority, seq)),
            task,
        }
    }

    #[test]
    fn heap_pops_lowest_priority_first_then_push_order() {
        let mut heap = BinaryHeap::new();
        heap.push(queued(25, 0));
        heap.push(queued(6, 1));
        heap.push(queued(6, 2));
        heap.push(queued(0, 3));

        let order: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|q| q.key.0)
            .collect();
        assert_eq!(order, vec![(0, 3), (6, 1), (6, 2), (25, 0)]);
    }
}
