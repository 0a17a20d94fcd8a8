//! Watch command - Sync periodically until interrupted
//!
//! Runs the scheduler with the configured poll interval. Ctrl-C stops the
//! running pass (pending tasks are dropped, running ones finish) and then
//! ends the scheduler.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use driftsync_sync::{SyncEngine, SyncEvent, SyncScheduler};
use tracing::{debug, info};

use super::{load_valid_config, open_context};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Seconds between passes (overrides sync.poll_interval)
    #[arg(long)]
    pub interval: Option<u64>,
}

impl WatchCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let config = load_valid_config(config_path)?;
        let interval = Duration::from_secs(self.interval.unwrap_or(config.sync.poll_interval).max(1));

        let (ctx, pool) = open_context(&config).await?;
        let mut events = ctx.events.subscribe();
        let engine = Arc::new(SyncEngine::new(ctx));
        let scheduler = Arc::new(SyncScheduler::new(engine.clone(), interval));
        let token = scheduler.cancellation_token();

        let progress = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    SyncEvent::TransferProgress { path, transferred, total, .. } => {
                        debug!(path = %path, transferred, total, "Transfer progress");
                    }
                    other => debug!(event = ?other, "Sync event"),
                }
            }
        });

        let mut runner = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run().await }
        });

        formatter.success(&format!(
            "Watching {} (every {}s, Ctrl-C to stop)",
            config.sync.root.display(),
            interval.as_secs()
        ));

        let result = tokio::select! {
            joined = &mut runner => joined?,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupted, stopping");
                engine.stop(false).await;
                token.cancel();
                runner.await?
            }
        };

        progress.abort();
        pool.close().await;
        result?;
        formatter.success("Stopped");
        Ok(())
    }
}
