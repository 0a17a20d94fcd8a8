//! Sync scheduler - runs passes periodically or on demand
//!
//! ```text
//! interval tick ──┐
//!                 ├──→ SyncScheduler ──→ PassRunner::run_pass
//! trigger() ──────┘          │
//!                     CancellationToken
//! ```
//!
//! The first pass starts right away. A failed pass is logged and the next
//! one runs at the following tick; only rejected credentials end the loop,
//! since retrying without new ones cannot succeed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{SyncEngine, SyncReport};
use crate::SyncError;

/// Something that runs one sync pass
#[async_trait]
pub trait PassRunner: Send + Sync {
    async fn run_pass(&self) -> Result<SyncReport, SyncError>;
}

#[async_trait]
impl PassRunner for SyncEngine {
    async fn run_pass(&self) -> Result<SyncReport, SyncError> {
        self.run().await
    }
}

pub struct SyncScheduler {
    runner: Arc<dyn PassRunner>,
    poll_interval: Duration,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
}

impl SyncScheduler {
    pub fn new(runner: Arc<dyn PassRunner>, poll_interval: Duration) -> Self {
        info!(poll_secs = poll_interval.as_secs(), "Creating sync scheduler");
        Self {
            runner,
            poll_interval,
            trigger: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Requests a pass now instead of at the next tick
    ///
    /// A trigger arriving while a pass runs starts another one right after.
    pub fn trigger(&self) {
        debug!("Sync triggered");
        self.trigger.notify_one();
    }

    /// Token ending [`run`](Self::run) once cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs passes until cancelled
    ///
    /// Returns an error only when credentials were rejected.
    pub async fn run(&self) -> Result<(), SyncError> {
        info!("Sync scheduler starting");
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.trigger.notified() => {}
                _ = ticker.tick() => {}
            }

            match self.runner.run_pass().await {
                Ok(report) => debug!(?report, "Scheduled pass done"),
                Err(err) if err.is_unauthorized() => {
                    error!(error = %err, "Credentials rejected, scheduler stops");
                    return Err(err);
                }
                Err(err) => warn!(error = %err, "Sync pass failed, retrying at the next interval"),
            }
            // a pass may take longer than the interval; count from its end
            ticker.reset();
        }

        info!("Sync scheduler stopped");
        Ok(())
    }
}
