pub mod config;
pub mod selective;
pub mod status;
pub mod sync;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use driftsync_api::HttpRemoteService;
use driftsync_cache::DatabasePool;
use driftsync_core::config::Config;
use driftsync_sync::SyncContext;
use tracing::info;

/// Loads the configuration and refuses to continue on validation errors
pub fn load_valid_config(path: &Path) -> Result<Config> {
    let config = Config::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    let errors = config.validate();
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        bail!("Invalid configuration: {}", messages.join("; "));
    }
    info!(config_path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Opens the sync instance with the HTTP remote adapter
pub async fn open_context(config: &Config) -> Result<(SyncContext, DatabasePool)> {
    let remote = HttpRemoteService::from_config(&config.api)?;
    let (ctx, pool) = SyncContext::open(config, Arc::new(remote))
        .await
        .context("Failed to open sync instance")?;
    Ok((ctx, pool))
}
