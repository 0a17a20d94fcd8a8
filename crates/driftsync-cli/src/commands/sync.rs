//! Sync command - Run one sync pass
//!
//! Provides the `driftsync sync` CLI command which:
//! 1. Loads and validates the configuration
//! 2. Opens the sync instance with the HTTP remote adapter
//! 3. Runs one pass and prints its report

use std::path::Path;

use anyhow::Result;
use clap::Args;
use driftsync_sync::{SyncEngine, SyncReport};
use tracing::info;

use super::{load_valid_config, open_context};
use crate::output::{format_duration, get_formatter, plural, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Forget the stored cursor and list the whole remote tree
    #[arg(long)]
    pub full: bool,
}

impl SyncCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let config = load_valid_config(config_path)?;
        let (ctx, pool) = open_context(&config).await?;

        if self.full {
            info!("Full listing requested, dropping stored cursor");
            let cursor = ctx.cursor.path().to_path_buf();
            match tokio::fs::remove_file(&cursor).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        formatter.info("Starting synchronization...");
        let engine = SyncEngine::new(ctx);
        let result = engine.run().await;
        pool.close().await;

        print_report(formatter.as_ref(), format, &result?);
        Ok(())
    }
}

pub fn print_report(formatter: &dyn OutputFormatter, format: OutputFormat, report: &SyncReport) {
    if format.is_json() {
        formatter.print_json(&serde_json::to_value(report).unwrap_or_default());
        return;
    }

    let transfers = report.uploaded + report.downloaded;
    let actions = report.local_actions + report.remote_actions;
    if report.stopped {
        formatter.warn("Sync stopped before it finished");
    } else if transfers == 0 && actions == 0 && report.queued_errors == 0 {
        formatter.success("Already up to date");
    } else {
        formatter.success(&format!("Sync completed in {}", format_duration(report.duration_ms)));
    }

    if report.downloaded > 0 {
        formatter.info(&format!("Downloaded: {}", plural(report.downloaded, "file")));
    }
    if report.uploaded > 0 {
        formatter.info(&format!("Uploaded:   {}", plural(report.uploaded, "file")));
    }
    if actions > 0 {
        formatter.info(&format!(
            "Applied:    {} locally, {} remotely",
            report.remote_actions, report.local_actions
        ));
    }
    if report.queued_errors > 0 {
        formatter.warn(&format!(
            "{} will be retried on the next pass",
            plural(report.queued_errors, "failed change")
        ));
    }
}
