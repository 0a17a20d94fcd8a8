//! Stale transfer cleanup
//!
//! Transfers that did not finish within the retention window will not be
//! resumed. Their bookkeeping records and temp files are removed, and the
//! temp directory is swept for files no record points to any more (left
//! behind by a crash between writing the file and saving the record).

use std::io::ErrorKind;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use driftsync_core::domain::retention_cutoff;
use driftsync_core::ports::ITransferStore;
use tracing::{debug, info, instrument, warn};

use crate::context::SyncContext;
use crate::SyncError;

/// What one collection removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectedGarbage {
    pub records: u64,
    pub temp_files: u64,
}

pub struct GarbageCollector {
    transfers: Arc<dyn ITransferStore>,
    temp_dir: PathBuf,
}

impl GarbageCollector {
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            transfers: ctx.transfers.clone(),
            temp_dir: ctx.settings.temp_dir.clone(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<CollectedGarbage, SyncError> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<CollectedGarbage, SyncError> {
        let cutoff = retention_cutoff(now);
        let mut collected = CollectedGarbage::default();

        for record in self.transfers.created_before(cutoff).await? {
            let Some(name) = record.temp_name() else { continue };
            let path = self.temp_dir.join(name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => collected.temp_files += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        collected.records = self.transfers.remove_created_before(cutoff).await?;
        collected.temp_files += self.sweep_temp_dir(cutoff).await?;

        info!(records = collected.records, temp_files = collected.temp_files, "Garbage collected");
        Ok(collected)
    }

    async fn sweep_temp_dir(&self, cutoff: DateTime<Utc>) -> Result<u64, SyncError> {
        let mut entries = match tokio::fs::read_dir(&self.temp_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match tokio::fs::symlink_metadata(&path).await {
                Ok(metadata) => metadata,
                // listed but already gone, or not ours to inspect; next run retries
                Err(e) if matches!(e.kind(), ErrorKind::PermissionDenied | ErrorKind::NotFound) => {
                    debug!(path = %path.display(), error = %e, "Skipping temp entry");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let created = DateTime::from_timestamp(metadata.ctime(), metadata.ctime_nsec() as u32);
            if created.map_or(true, |created| created >= cutoff) {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    warn!(path = %path.display(), "No permission to remove stale temp file");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}
