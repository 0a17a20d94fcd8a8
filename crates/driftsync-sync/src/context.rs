//! Per-instance handles shared by every sync component
//!
//! One [`SyncContext`] is built per instance directory and handed to the
//! scanner, the delta applier, the queues and the engine. Nothing in this
//! crate keeps process-wide state.

use std::path::PathBuf;
use std::sync::Arc;

use driftsync_cache::{
    DatabasePool, InstanceLayout, LastCursor, SqliteIgnoreStore, SqliteNodeStore,
    SqliteQueueErrorStore, SqliteTransferStore,
};
use driftsync_conflict::ConflictNamer;
use driftsync_core::config::{Config, ContentCheck};
use driftsync_core::ports::{
    IIgnoreStore, ILocalFileSystem, INodeStore, IQueueErrorStore, IRemoteService, ITransferStore,
};
use tracing::info;

use crate::events::EventBus;
use crate::filesystem::LocalFileSystem;
use crate::SyncError;

/// Tunables of the engine, taken from the `sync` and `api` config sections
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Embedded in local conflict names
    pub username: String,
    pub content_check: ContentCheck,
    /// Workers for create / rename / move / remove tasks
    pub action_concurrency: usize,
    /// Workers for uploads and downloads
    pub max_concurrent_connections: usize,
    pub chunk_size: usize,
    /// Where partial downloads live
    pub temp_dir: PathBuf,
}

impl SyncSettings {
    pub fn from_config(config: &Config, temp_dir: PathBuf) -> Self {
        Self {
            username: config.sync.username.clone(),
            content_check: config.sync.content_check(),
            action_concurrency: config.sync.action_concurrency.max(1) as usize,
            max_concurrent_connections: config.sync.max_concurrent_connections.max(1) as usize,
            chunk_size: config.api.chunk_size_bytes().max(1),
            temp_dir,
        }
    }

    /// Defaults suitable for tests: one action worker, three transfer workers
    pub fn with_temp_dir(temp_dir: PathBuf) -> Self {
        Self {
            username: String::new(),
            content_check: ContentCheck::Fast,
            action_concurrency: 1,
            max_concurrent_connections: 3,
            chunk_size: 4 * 1024 * 1024,
            temp_dir,
        }
    }
}

/// Stores, adapters and settings of one sync instance
#[derive(Clone)]
pub struct SyncContext {
    pub nodes: Arc<dyn INodeStore>,
    pub ignored: Arc<dyn IIgnoreStore>,
    pub queue_errors: Arc<dyn IQueueErrorStore>,
    pub transfers: Arc<dyn ITransferStore>,
    pub fs: Arc<dyn ILocalFileSystem>,
    pub remote: Arc<dyn IRemoteService>,
    pub cursor: LastCursor,
    pub settings: SyncSettings,
    pub events: EventBus,
}

impl SyncContext {
    /// Builds the four SQLite stores on an open pool
    pub fn with_pool(
        pool: &DatabasePool,
        fs: Arc<dyn ILocalFileSystem>,
        remote: Arc<dyn IRemoteService>,
        cursor: LastCursor,
        settings: SyncSettings,
    ) -> Self {
        let sqlite = pool.pool().clone();
        Self {
            nodes: Arc::new(SqliteNodeStore::new(sqlite.clone())),
            ignored: Arc::new(SqliteIgnoreStore::new(sqlite.clone())),
            queue_errors: Arc::new(SqliteQueueErrorStore::new(sqlite.clone())),
            transfers: Arc::new(SqliteTransferStore::new(sqlite)),
            fs,
            remote,
            cursor,
            settings,
            events: EventBus::new(),
        }
    }

    /// Prepares the instance directory and opens its database
    ///
    /// Returns the pool too so the caller can close it on shutdown.
    pub async fn open(
        config: &Config,
        remote: Arc<dyn IRemoteService>,
    ) -> Result<(Self, DatabasePool), SyncError> {
        if !config.sync.root.is_dir() {
            return Err(SyncError::Config(format!(
                "sync root {} is not a directory",
                config.sync.root.display()
            )));
        }

        let layout = InstanceLayout::new(&config.sync.instance_dir);
        if layout.prepare()? {
            info!(instance = %layout.root().display(), "Instance state was reset, next pass lists everything");
        }

        let pool = DatabasePool::new(&layout.db_path()).await?;
        let fs: Arc<dyn ILocalFileSystem> = Arc::new(LocalFileSystem::new(&config.sync.root));
        let settings = SyncSettings::from_config(config, layout.temp_dir());
        let ctx = Self::with_pool(&pool, fs, remote, layout.last_cursor(), settings);
        Ok((ctx, pool))
    }

    pub fn namer(&self) -> ConflictNamer {
        ConflictNamer::new(self.settings.username.clone())
    }
}
