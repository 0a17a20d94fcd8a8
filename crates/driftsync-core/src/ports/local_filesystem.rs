//! Local filesystem port (driven/secondary port)
//!
//! The syscalls the scanner and the queue handlers need, addressed by
//! sync-root-relative posix paths (`/docs/a.txt`).
//!
//! ## Design Notes
//!
//! - `stat` never follows symlinks and returns `Ok(None)` for a missing entry,
//!   so "gone" is not an error.
//! - Names returned by `read_dir` are already normalized to the host's
//!   Unicode form.
//! - Content hashes are lowercase MD5 hex, the fingerprint the remote
//!   service reports.

use std::path::{Path, PathBuf};

use crate::domain::FileStat;

/// Port trait for local filesystem access below the sync root
#[async_trait::async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Absolute host path of a root-relative path
    fn absolute(&self, path: &str) -> PathBuf;

    /// `lstat`; `None` if nothing exists at `path`
    async fn stat(&self, path: &str) -> anyhow::Result<Option<FileStat>>;

    async fn exists(&self, path: &str) -> anyhow::Result<bool> {
        Ok(self.stat(path).await?.is_some())
    }

    /// Entry names of a directory, unsorted
    async fn read_dir(&self, path: &str) -> anyhow::Result<Vec<String>>;

    async fn rename(&self, from: &str, to: &str) -> anyhow::Result<()>;

    async fn unlink(&self, path: &str) -> anyhow::Result<()>;

    /// Removes an empty directory
    async fn remove_dir(&self, path: &str) -> anyhow::Result<()>;

    async fn remove_dir_all(&self, path: &str) -> anyhow::Result<()>;

    /// Creates one directory; `Ok(false)` if it already existed
    async fn create_dir(&self, path: &str) -> anyhow::Result<bool>;

    async fn create_dir_all(&self, path: &str) -> anyhow::Result<()>;

    /// MD5 hex digest of a file's content
    async fn md5(&self, path: &str) -> anyhow::Result<String>;

    /// Reads up to `len` bytes starting at `offset`
    async fn read_chunk(&self, path: &str, offset: u64, len: usize) -> anyhow::Result<Vec<u8>>;

    /// Moves a finished download from outside the tree into place
    async fn adopt_file(&self, source: &Path, dest: &str) -> anyhow::Result<()>;
}
