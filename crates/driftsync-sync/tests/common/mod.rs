//! In-memory remote service and a temp-dir backed sync instance

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use md5::{Digest, Md5};
use tempfile::TempDir;

use driftsync_cache::{DatabasePool, LastCursor};
use driftsync_core::domain::path::{join_path, name_of, parent_of, ROOT};
use driftsync_core::domain::DeltaCursor;
use driftsync_core::ports::{
    ApiError, ApiErrorCode, DeltaRequest, IRemoteService, RemoteAttributes, RemoteDeltaNode,
    RemoteDeltaPage, UploadChunk, UploadedFile,
};
use driftsync_sync::context::SyncSettings;
use driftsync_sync::{LocalFileSystem, SyncContext, SyncEngine};

pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

// ============================================================================
// FakeRemote
// ============================================================================

#[derive(Debug, Clone)]
struct RemoteEntry {
    id: String,
    path: String,
    directory: bool,
    content: Vec<u8>,
    version: u64,
    deleted: bool,
}

#[derive(Default)]
struct State {
    entries: Vec<RemoteEntry>,
    events: Vec<RemoteDeltaNode>,
    next_id: u64,
    uploads: HashMap<String, Vec<u8>>,
    failing_uploads: HashSet<String>,
    unauthorized: bool,
}

impl State {
    fn live(&self, path: &str) -> Option<&RemoteEntry> {
        self.entries.iter().find(|e| !e.deleted && e.path == path)
    }

    fn live_index(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| !e.deleted && e.id == id)
    }

    fn parent_id(&self, path: &str) -> Result<Option<String>, ApiError> {
        let parent = parent_of(path);
        if parent == ROOT {
            return Ok(None);
        }
        self.live(&parent)
            .filter(|e| e.directory)
            .map(|e| Some(e.id.clone()))
            .ok_or_else(|| ApiError::new(ApiErrorCode::DestinationNotFound, format!("no collection {parent}")))
    }

    fn event(&self, entry: &RemoteEntry) -> RemoteDeltaNode {
        let file = !entry.directory;
        RemoteDeltaNode {
            id: entry.id.clone(),
            path: entry.path.clone(),
            parent: self.parent_id(&entry.path).ok().flatten(),
            directory: entry.directory,
            deleted: entry.deleted,
            hash: file.then(|| md5_hex(&entry.content)),
            version: file.then(|| format!("v{}", entry.version)),
            size: file.then(|| entry.content.len() as u64),
        }
    }

    fn attributes(&self, entry: &RemoteEntry) -> RemoteAttributes {
        let event = self.event(entry);
        RemoteAttributes {
            id: entry.id.clone(),
            name: Some(name_of(&entry.path).to_string()),
            path: Some(entry.path.clone()),
            parent: event.parent,
            hash: event.hash,
            version: event.version,
            size: event.size,
            ..RemoteAttributes::default()
        }
    }

    fn record(&mut self, index: usize) {
        let event = self.event(&self.entries[index]);
        self.events.push(event);
    }

    fn insert(&mut self, path: &str, directory: bool, content: Vec<u8>) -> Result<String, ApiError> {
        if self.live(path).is_some() {
            return Err(ApiError::new(ApiErrorCode::AlreadyExists, format!("{path} exists")));
        }
        self.parent_id(path)?;
        self.next_id += 1;
        let id = format!("r{}", self.next_id);
        self.entries.push(RemoteEntry {
            id: id.clone(),
            path: path.to_string(),
            directory,
            content,
            version: 1,
            deleted: false,
        });
        self.record(self.entries.len() - 1);
        Ok(id)
    }

    fn relocate(&mut self, id: &str, new_path: &str) -> Result<(), ApiError> {
        let index = self
            .live_index(id)
            .ok_or_else(|| ApiError::new(ApiErrorCode::NotFound, id.to_string()))?;
        if self.live(new_path).is_some() {
            return Err(ApiError::new(ApiErrorCode::AlreadyExists, format!("{new_path} exists")));
        }
        self.parent_id(new_path)?;

        let old_prefix = format!("{}/", self.entries[index].path);
        for entry in self.entries.iter_mut().filter(|e| e.path.starts_with(&old_prefix)) {
            entry.path = format!("{new_path}/{}", &entry.path[old_prefix.len()..]);
        }
        self.entries[index].path = new_path.to_string();
        self.record(index);
        Ok(())
    }

    fn check_credentials(&self) -> Result<(), ApiError> {
        if self.unauthorized {
            return Err(ApiError::new(ApiErrorCode::Unauthorized, "token expired"));
        }
        Ok(())
    }
}

/// Remote service keeping its tree and change log in memory
///
/// Every mutation, whether made by a test or by the engine, is appended to
/// the change log the way a real server reports it.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<State>,
}

impl FakeRemote {
    pub fn add_dir(&self, path: &str) -> String {
        self.state.lock().unwrap().insert(path, true, Vec::new()).unwrap()
    }

    pub fn add_file(&self, path: &str, content: &str) -> String {
        self.state
            .lock()
            .unwrap()
            .insert(path, false, content.as_bytes().to_vec())
            .unwrap()
    }

    pub fn remove(&self, path: &str) {
        let id = self.id_of(path).expect("remote path exists");
        self.state.lock().unwrap().delete(&id).unwrap();
    }

    pub fn id_of(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().live(path).map(|e| e.id.clone())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.id_of(path).is_some()
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .live(path)
            .map(|e| String::from_utf8_lossy(&e.content).into_owned())
    }

    /// Makes uploads to `path` fail with a retryable error
    pub fn fail_uploads_to(&self, path: &str) {
        self.state.lock().unwrap().failing_uploads.insert(path.to_string());
    }

    pub fn accept_uploads_to(&self, path: &str) {
        self.state.lock().unwrap().failing_uploads.remove(path);
    }

    pub fn reject_credentials(&self) {
        self.state.lock().unwrap().unauthorized = true;
    }
}

impl State {
    fn delete(&mut self, id: &str) -> Result<(), ApiError> {
        let index = self
            .live_index(id)
            .ok_or_else(|| ApiError::new(ApiErrorCode::NotFound, id.to_string()))?;
        let prefix = format!("{}/", self.entries[index].path);
        for entry in self.entries.iter_mut().filter(|e| e.path.starts_with(&prefix)) {
            entry.deleted = true;
        }
        self.entries[index].deleted = true;
        self.record(index);
        Ok(())
    }
}

#[async_trait::async_trait]
impl IRemoteService for FakeRemote {
    async fn create_collection(&self, path: &str) -> Result<String, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.check_credentials()?;
        state.insert(path, true, Vec::new())
    }

    async fn rename_node(&self, remote_id: &str, name: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.check_credentials()?;
        let index = state
            .live_index(remote_id)
            .ok_or_else(|| ApiError::new(ApiErrorCode::NotFound, remote_id.to_string()))?;
        let new_path = join_path(&parent_of(&state.entries[index].path), name);
        state.relocate(remote_id, &new_path)
    }

    async fn move_node(&self, remote_id: &str, destination: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.check_credentials()?;
        let index = state
            .live_index(remote_id)
            .ok_or_else(|| ApiError::new(ApiErrorCode::NotFound, remote_id.to_string()))?;
        let new_path = join_path(destination, name_of(&state.entries[index].path));
        state.relocate(remote_id, &new_path)
    }

    async fn delete_node(&self, remote_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.check_credentials()?;
        state.delete(remote_id)
    }

    async fn upload_chunk(&self, chunk: UploadChunk) -> Result<Option<UploadedFile>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.check_credentials()?;
        if state.failing_uploads.contains(&chunk.path) {
            return Err(ApiError::new(ApiErrorCode::Unknown, "storage unavailable"));
        }

        state
            .uploads
            .entry(chunk.chunk_group.clone())
            .or_default()
            .extend_from_slice(&chunk.data);
        if chunk.index + 1 < chunk.total_chunks {
            return Ok(None);
        }
        let content = state.uploads.remove(&chunk.chunk_group).unwrap_or_default();

        let existing = chunk.remote_id.as_deref().and_then(|id| state.live_index(id));
        let index = match existing {
            Some(index) => {
                let entry = &mut state.entries[index];
                entry.content = content;
                entry.version += 1;
                state.record(index);
                index
            }
            None => {
                let id = state.insert(&chunk.path, false, content)?;
                state.live_index(&id).unwrap()
            }
        };

        let entry = &state.entries[index];
        Ok(Some(UploadedFile {
            remote_id: entry.id.clone(),
            version: format!("v{}", entry.version),
            hash: md5_hex(&entry.content),
        }))
    }

    async fn download_file(
        &self,
        remote_id: &str,
        _version: Option<&str>,
        offset: u64,
        dest: &Path,
    ) -> Result<u64, ApiError> {
        let content = {
            let state = self.state.lock().unwrap();
            state.check_credentials()?;
            let index = state
                .live_index(remote_id)
                .ok_or_else(|| ApiError::new(ApiErrorCode::NotFound, remote_id.to_string()))?;
            state.entries[index].content[offset as usize..].to_vec()
        };

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dest)
            .map_err(|e| ApiError::new(ApiErrorCode::Transport, e.to_string()))?;
        file.write_all(&content)
            .map_err(|e| ApiError::new(ApiErrorCode::Transport, e.to_string()))?;
        Ok(content.len() as u64)
    }

    async fn get_attributes(&self, path: &str) -> Result<RemoteAttributes, ApiError> {
        let state = self.state.lock().unwrap();
        state.check_credentials()?;
        state
            .live(path)
            .map(|e| state.attributes(e))
            .ok_or_else(|| ApiError::new(ApiErrorCode::NotFound, path.to_string()))
    }

    async fn get_attributes_by_ids(&self, ids: &[String]) -> Result<Vec<RemoteAttributes>, ApiError> {
        let state = self.state.lock().unwrap();
        state.check_credentials()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.live_index(id))
            .map(|index| state.attributes(&state.entries[index]))
            .collect())
    }

    async fn node_delta(&self, request: &DeltaRequest) -> Result<RemoteDeltaPage, ApiError> {
        let state = self.state.lock().unwrap();
        state.check_credentials()?;

        let listing = |filter: &dyn Fn(&RemoteEntry) -> bool| {
            let mut live: Vec<&RemoteEntry> = state
                .entries
                .iter()
                .filter(|e| !e.deleted && filter(*e))
                .collect();
            live.sort_by(|a, b| a.path.cmp(&b.path));
            live.into_iter().map(|e| state.event(e)).collect::<Vec<_>>()
        };

        let (nodes, cursor) = match request {
            DeltaRequest::Cursor(None) => (listing(&|_| true), Some(state.events.len())),
            DeltaRequest::Cursor(Some(cursor)) => {
                let from: usize = cursor.as_str().parse().unwrap_or(0);
                (state.events[from.min(state.events.len())..].to_vec(), Some(state.events.len()))
            }
            DeltaRequest::Node(id) => {
                let Some(index) = state.live_index(id) else {
                    return Err(ApiError::new(ApiErrorCode::NotFound, id.clone()));
                };
                let root = state.entries[index].path.clone();
                let prefix = format!("{root}/");
                (listing(&|e| e.path == root || e.path.starts_with(&prefix)), None)
            }
        };

        Ok(RemoteDeltaPage {
            cursor: cursor.map(|c| DeltaCursor::new(c.to_string()).unwrap()),
            has_more: false,
            reset: false,
            nodes,
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

/// One sync instance: a local root, an instance directory and a fake remote
pub struct Harness {
    pub root: TempDir,
    pub instance: TempDir,
    pub remote: Arc<FakeRemote>,
    pub ctx: SyncContext,
    pub engine: SyncEngine,
    _pool: DatabasePool,
}

impl Harness {
    pub async fn new() -> Self {
        let root = TempDir::new().unwrap();
        let instance = TempDir::new().unwrap();
        let pool = DatabasePool::in_memory()
            .await
            .expect("Failed to create in-memory database");
        let remote = Arc::new(FakeRemote::default());

        let ctx = SyncContext::with_pool(
            &pool,
            Arc::new(LocalFileSystem::new(root.path())),
            remote.clone(),
            LastCursor::new(instance.path().join("last-cursor")),
            SyncSettings::with_temp_dir(instance.path().join("temp")),
        );
        let engine = SyncEngine::new(ctx.clone());

        Self {
            root,
            instance,
            remote,
            ctx,
            engine,
            _pool: pool,
        }
    }

    pub fn local(&self, path: &str) -> PathBuf {
        self.root.path().join(path.trim_start_matches('/'))
    }

    pub fn write(&self, path: &str, content: &str) {
        let local = self.local(path);
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(local, content).unwrap();
    }

    pub fn read(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.local(path)).ok()
    }
}
