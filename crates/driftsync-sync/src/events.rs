//! Lifecycle notifications
//!
//! Observers subscribe to a broadcast channel of [`SyncEvent`]s. Sending never
//! blocks and never fails the pass; events sent without subscribers are
//! dropped.
//!
//! Ordering: `TransferStart` is sent before the first queued task runs and
//! `TransferEnd` after the queues drained (or were stopped).

use driftsync_core::domain::NodeId;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Something observers of a sync pass may care about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    TransferStart,
    TransferProgress {
        node_id: NodeId,
        path: String,
        transferred: u64,
        total: u64,
    },
    TransferEnd,
    Stopped {
        force_quit: bool,
    },
}

/// Sending half shared by the engine and the queues
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: SyncEvent) {
        // no subscribers is fine
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
