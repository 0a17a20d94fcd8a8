//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] on top of `tokio::fs` for the tree below
//! one sync root.
//!
//! ## Design Decisions
//!
//! - **Root-relative addressing**: callers pass `/docs/a.txt`; the adapter
//!   resolves it below the configured root and never leaves it.
//! - **lstat semantics**: `stat` never follows symlinks so the scanner can
//!   skip them.
//! - **MD5**: content is hashed in 64 KiB blocks, matching the fingerprint
//!   the remote service reports.
//! - **Adoption across devices**: a finished download is renamed into place,
//!   falling back to copy + remove when the temp directory lives on another
//!   filesystem.

use std::io::{ErrorKind, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use driftsync_core::domain::path::normalize_name;
use driftsync_core::domain::FileStat;
use driftsync_core::ports::ILocalFileSystem;
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, instrument, warn};

const HASH_BLOCK_SIZE: usize = 64 * 1024;

// ============================================================================
// LocalFileSystem struct
// ============================================================================

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    /// Create an adapter for the tree below `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn to_stat(metadata: &std::fs::Metadata) -> FileStat {
    let mtime: DateTime<Utc> = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    let ctime = DateTime::from_timestamp(metadata.ctime(), metadata.ctime_nsec() as u32)
        .unwrap_or(mtime);

    FileStat {
        ino: metadata.ino(),
        is_dir: metadata.is_dir(),
        is_symlink: metadata.file_type().is_symlink(),
        size: if metadata.is_dir() { 0 } else { metadata.len() },
        mtime,
        ctime,
    }
}

// ============================================================================
// ILocalFileSystem implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystem {
    fn absolute(&self, path: &str) -> PathBuf {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    async fn stat(&self, path: &str) -> anyhow::Result<Option<FileStat>> {
        match tokio::fs::symlink_metadata(self.absolute(path)).await {
            Ok(metadata) => Ok(Some(to_stat(&metadata))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("lstat {path}")),
        }
    }

    async fn read_dir(&self, path: &str) -> anyhow::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.absolute(path))
            .await
            .with_context(|| format!("readdir {path}"))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            match entry.file_name().into_string() {
                Ok(name) => names.push(normalize_name(&name)),
                Err(raw) => warn!(parent = %path, name = ?raw, "Skipping entry with a non UTF-8 name"),
            }
        }
        Ok(names)
    }

    #[instrument(skip(self))]
    async fn rename(&self, from: &str, to: &str) -> anyhow::Result<()> {
        tokio::fs::rename(self.absolute(from), self.absolute(to))
            .await
            .with_context(|| format!("rename {from} -> {to}"))?;
        debug!("renamed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unlink(&self, path: &str) -> anyhow::Result<()> {
        tokio::fs::remove_file(self.absolute(path))
            .await
            .with_context(|| format!("unlink {path}"))
    }

    #[instrument(skip(self))]
    async fn remove_dir(&self, path: &str) -> anyhow::Result<()> {
        tokio::fs::remove_dir(self.absolute(path))
            .await
            .with_context(|| format!("rmdir {path}"))
    }

    #[instrument(skip(self))]
    async fn remove_dir_all(&self, path: &str) -> anyhow::Result<()> {
        tokio::fs::remove_dir_all(self.absolute(path))
            .await
            .with_context(|| format!("rm -r {path}"))
    }

    #[instrument(skip(self))]
    async fn create_dir(&self, path: &str) -> anyhow::Result<bool> {
        match tokio::fs::create_dir(self.absolute(path)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e).with_context(|| format!("mkdir {path}")),
        }
    }

    #[instrument(skip(self))]
    async fn create_dir_all(&self, path: &str) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(self.absolute(path))
            .await
            .with_context(|| format!("mkdir -p {path}"))
    }

    #[instrument(skip(self))]
    async fn md5(&self, path: &str) -> anyhow::Result<String> {
        let mut file = tokio::fs::File::open(self.absolute(path))
            .await
            .with_context(|| format!("open {path}"))?;

        let mut hasher = Md5::new();
        let mut buf = vec![0u8; HASH_BLOCK_SIZE];
        loop {
            let read = file.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }

        let hash = format!("{:x}", hasher.finalize());
        debug!(hash = %hash, "hash computed");
        Ok(hash)
    }

    async fn read_chunk(&self, path: &str, offset: u64, len: usize) -> anyhow::Result<Vec<u8>> {
        let mut file = tokio::fs::File::open(self.absolute(path))
            .await
            .with_context(|| format!("open {path}"))?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut data = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut data).await?;
        Ok(data)
    }

    #[instrument(skip(self, source), fields(source = %source.display()))]
    async fn adopt_file(&self, source: &Path, dest: &str) -> anyhow::Result<()> {
        let target = self.absolute(dest);
        if tokio::fs::rename(source, &target).await.is_ok() {
            return Ok(());
        }

        debug!("rename failed, copying across filesystems");
        tokio::fs::copy(source, &target)
            .await
            .with_context(|| format!("copy download into {dest}"))?;
        tokio::fs::remove_file(source).await?;
        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn adapter(dir: &TempDir) -> LocalFileSystem {
        LocalFileSystem::new(dir.path())
    }

    // ------------------------------------------------------------------
    // stat
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_stat_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let fs = adapter(&dir);
        assert!(fs.stat("/nope.txt").await.unwrap().is_none());
        assert!(!fs.exists("/nope.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_stat_reports_ino_and_size() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let fs = adapter(&dir);

        let stat = fs.stat("/a.txt").await.unwrap().unwrap();
        assert_eq!(stat.size, 5);
        assert!(!stat.is_dir);
        assert!(stat.ino > 0);

        fs.rename("/a.txt", "/b.txt").await.unwrap();
        let renamed = fs.stat("/b.txt").await.unwrap().unwrap();
        assert_eq!(renamed.ino, stat.ino);
    }

    #[tokio::test]
    async fn test_stat_does_not_follow_symlinks() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("target"), b"x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("target"), dir.path().join("link")).unwrap();

        let stat = adapter(&dir).stat("/link").await.unwrap().unwrap();
        assert!(stat.is_symlink);
    }

    // ------------------------------------------------------------------
    // directories
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_dir_reports_existing() {
        let dir = TempDir::new().unwrap();
        let fs = adapter(&dir);

        assert!(fs.create_dir("/docs").await.unwrap());
        assert!(!fs.create_dir("/docs").await.unwrap());
        fs.create_dir_all("/docs/a/b").await.unwrap();

        let mut names = fs.read_dir("/docs").await.unwrap();
        names.sort();
        assert_eq!(names, vec!["a"]);

        fs.remove_dir_all("/docs").await.unwrap();
        assert!(!fs.exists("/docs").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_dir_of_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        assert!(adapter(&dir).read_dir("/missing").await.is_err());
    }

    // ------------------------------------------------------------------
    // content
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_md5_matches_known_digest() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello world").unwrap();

        let hash = adapter(&dir).md5("/a.txt").await.unwrap();
        assert_eq!(hash, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[tokio::test]
    async fn test_read_chunk_at_offset() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.bin"), b"0123456789").unwrap();
        let fs = adapter(&dir);

        assert_eq!(fs.read_chunk("/a.bin", 2, 3).await.unwrap(), b"234");
        assert_eq!(fs.read_chunk("/a.bin", 8, 5).await.unwrap(), b"89");
    }

    #[tokio::test]
    async fn test_adopt_file_moves_into_tree() {
        let root = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("download");
        std::fs::write(&source, b"payload").unwrap();

        let fs = adapter(&root);
        fs.adopt_file(&source, "/in-tree.txt").await.unwrap();

        assert!(!source.exists());
        assert_eq!(std::fs::read(root.path().join("in-tree.txt")).unwrap(), b"payload");
    }

    #[test]
    fn test_absolute_resolves_below_root() {
        let fs = LocalFileSystem::new("/srv/sync");
        assert_eq!(fs.absolute("/"), PathBuf::from("/srv/sync"));
        assert_eq!(fs.absolute("/docs/a.txt"), PathBuf::from("/srv/sync/docs/a.txt"));
    }
}
