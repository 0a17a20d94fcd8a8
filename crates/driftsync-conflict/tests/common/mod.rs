//! Test doubles for the filesystem and remote ports

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use driftsync_cache::{DatabasePool, SqliteNodeStore};
use driftsync_core::domain::FileStat;
use driftsync_core::ports::{
    ApiError, ApiErrorCode, DeltaRequest, ILocalFileSystem, IRemoteService, RemoteAttributes,
    RemoteDeltaPage, UploadChunk, UploadedFile,
};

pub async fn store() -> Arc<SqliteNodeStore> {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    Arc::new(SqliteNodeStore::new(pool.pool().clone()))
}

#[derive(Debug, Clone)]
struct Entry {
    ino: u64,
    is_dir: bool,
    size: u64,
    hash: String,
}

/// Flat in-memory tree keyed by root-relative path
#[derive(Default)]
pub struct MemoryFs {
    entries: Mutex<HashMap<String, Entry>>,
    failing_sources: Mutex<HashSet<String>>,
}

impl MemoryFs {
    pub fn add_file(&self, path: &str, ino: u64, content_hash: &str, size: u64) {
        self.entries.lock().unwrap().insert(
            path.to_string(),
            Entry {
                ino,
                is_dir: false,
                size,
                hash: content_hash.to_string(),
            },
        );
    }

    pub fn add_dir(&self, path: &str, ino: u64) {
        self.entries.lock().unwrap().insert(
            path.to_string(),
            Entry {
                ino,
                is_dir: true,
                size: 0,
                hash: String::new(),
            },
        );
    }

    /// Makes every rename away from `path` fail
    pub fn fail_renames_from(&self, path: &str) {
        self.failing_sources.lock().unwrap().insert(path.to_string());
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait::async_trait]
impl ILocalFileSystem for MemoryFs {
    fn absolute(&self, path: &str) -> PathBuf {
        PathBuf::from(path)
    }

    async fn stat(&self, path: &str) -> anyhow::Result<Option<FileStat>> {
        Ok(self.entries.lock().unwrap().get(path).map(|e| FileStat {
            ino: e.ino,
            is_dir: e.is_dir,
            is_symlink: false,
            size: e.size,
            mtime: Utc::now(),
            ctime: Utc::now(),
        }))
    }

    async fn read_dir(&self, _path: &str) -> anyhow::Result<Vec<String>> {
        anyhow::bail!("read_dir is not supported by MemoryFs")
    }

    async fn rename(&self, from: &str, to: &str) -> anyhow::Result<()> {
        if self.failing_sources.lock().unwrap().contains(from) {
            anyhow::bail!("EACCES: rename {from}");
        }
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .remove(from)
            .ok_or_else(|| anyhow::anyhow!("ENOENT: {from}"))?;
        entries.insert(to.to_string(), entry);
        Ok(())
    }

    async fn unlink(&self, path: &str) -> anyhow::Result<()> {
        self.entries.lock().unwrap().remove(path);
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> anyhow::Result<()> {
        self.unlink(path).await
    }

    async fn remove_dir_all(&self, path: &str) -> anyhow::Result<()> {
        self.unlink(path).await
    }

    async fn create_dir(&self, path: &str) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(path) {
            return Ok(false);
        }
        let ino = 10_000 + entries.len() as u64;
        entries.insert(
            path.to_string(),
            Entry {
                ino,
                is_dir: true,
                size: 0,
                hash: String::new(),
            },
        );
        Ok(true)
    }

    async fn create_dir_all(&self, path: &str) -> anyhow::Result<()> {
        self.create_dir(path).await.map(|_| ())
    }

    async fn md5(&self, path: &str) -> anyhow::Result<String> {
        self.entries
            .lock()
            .unwrap()
            .get(path)
            .map(|e| e.hash.clone())
            .ok_or_else(|| anyhow::anyhow!("ENOENT: {path}"))
    }

    async fn read_chunk(&self, _path: &str, _offset: u64, _len: usize) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("read_chunk is not supported by MemoryFs")
    }

    async fn adopt_file(&self, _source: &Path, _dest: &str) -> anyhow::Result<()> {
        anyhow::bail!("adopt_file is not supported by MemoryFs")
    }
}

/// Remote double that only records renames
#[derive(Default)]
pub struct RecordingRemote {
    pub renames: Mutex<Vec<(String, String)>>,
}

fn unsupported() -> ApiError {
    ApiError::new(ApiErrorCode::Unknown, "not supported by RecordingRemote")
}

#[async_trait::async_trait]
impl IRemoteService for RecordingRemote {
    async fn create_collection(&self, _path: &str) -> Result<String, ApiError> {
        Err(unsupported())
    }

    async fn rename_node(&self, remote_id: &str, name: &str) -> Result<(), ApiError> {
        self.renames
            .lock()
            .unwrap()
            .push((remote_id.to_string(), name.to_string()));
        Ok(())
    }

    async fn move_node(&self, _remote_id: &str, _destination: &str) -> Result<(), ApiError> {
        Err(unsupported())
    }

    async fn delete_node(&self, _remote_id: &str) -> Result<(), ApiError> {
        Err(unsupported())
    }

    async fn upload_chunk(&self, _chunk: UploadChunk) -> Result<Option<UploadedFile>, ApiError> {
        Err(unsupported())
    }

    async fn download_file(
        &self,
        _remote_id: &str,
        _version: Option<&str>,
        _offset: u64,
        _dest: &Path,
    ) -> Result<u64, ApiError> {
        Err(unsupported())
    }

    async fn get_attributes(&self, _path: &str) -> Result<RemoteAttributes, ApiError> {
        Err(unsupported())
    }

    async fn get_attributes_by_ids(&self, _ids: &[String]) -> Result<Vec<RemoteAttributes>, ApiError> {
        Err(unsupported())
    }

    async fn node_delta(&self, _request: &DeltaRequest) -> Result<RemoteDeltaPage, ApiError> {
        Err(unsupported())
    }
}
