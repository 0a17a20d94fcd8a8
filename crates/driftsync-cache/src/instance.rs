//! Instance directory layout
//!
//! ```text
//! <instance>/
//!   db/state.db     node, ignore, queue-error and transfer tables
//!   last-cursor     last consumed remote cursor
//!   temp/           partial downloads
//! ```
//!
//! The database and the cursor only make sense together: a cursor without
//! the records it was consumed into would skip changes, and records without
//! a cursor are re-matched by a full listing anyway. [`InstanceLayout::prepare`]
//! deletes whichever one exists alone.

use std::path::{Path, PathBuf};

use crate::cursor::LastCursor;
use crate::CacheError;

#[derive(Debug, Clone)]
pub struct InstanceLayout {
    root: PathBuf,
}

impl InstanceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("db").join("state.db")
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.root.join("last-cursor")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("temp")
    }

    pub fn last_cursor(&self) -> LastCursor {
        LastCursor::new(self.cursor_path())
    }

    /// Creates the directory tree and drops a lone database or cursor
    ///
    /// Returns `true` when state was discarded and the next pass starts
    /// from a full listing.
    pub fn prepare(&self) -> Result<bool, CacheError> {
        let db = self.db_path();
        let cursor = self.cursor_path();
        let mut reset = false;

        match (db.exists(), cursor.exists()) {
            (true, false) => {
                tracing::warn!(path = %db.display(), "State database without cursor, starting over");
                remove_database(&db)?;
                reset = true;
            }
            (false, true) => {
                tracing::warn!(path = %cursor.display(), "Cursor without state database, starting over");
                std::fs::remove_file(&cursor).map_err(|source| io_error(&cursor, source))?;
                reset = true;
            }
            _ => {}
        }

        for dir in [self.root.clone(), self.root.join("db"), self.temp_dir()] {
            std::fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        }

        let metadata = std::fs::metadata(&self.root).map_err(|source| io_error(&self.root, source))?;
        if metadata.permissions().readonly() {
            return Err(io_error(
                &self.root,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "instance directory is read-only"),
            ));
        }

        Ok(reset)
    }
}

/// Removes the database file together with its WAL side files
fn remove_database(db: &Path) -> Result<(), CacheError> {
    std::fs::remove_file(db).map_err(|source| io_error(db, source))?;
    for suffix in ["-wal", "-shm"] {
        let mut side = db.as_os_str().to_owned();
        side.push(suffix);
        let side = PathBuf::from(side);
        if side.exists() {
            std::fs::remove_file(&side).map_err(|source| io_error(&side, source))?;
        }
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = InstanceLayout::new(dir.path().join("instance"));

        assert!(!layout.prepare().unwrap());
        assert!(layout.db_path().parent().unwrap().is_dir());
        assert!(layout.temp_dir().is_dir());
    }

    #[test]
    fn lone_cursor_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let layout = InstanceLayout::new(dir.path());
        std::fs::write(layout.cursor_path(), "c1").unwrap();

        assert!(layout.prepare().unwrap());
        assert!(!layout.cursor_path().exists());
    }

    #[test]
    fn lone_database_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let layout = InstanceLayout::new(dir.path());
        std::fs::create_dir_all(layout.db_path().parent().unwrap()).unwrap();
        std::fs::write(layout.db_path(), b"").unwrap();

        assert!(layout.prepare().unwrap());
        assert!(!layout.db_path().exists());
    }

    #[test]
    fn database_with_cursor_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let layout = InstanceLayout::new(dir.path());
        std::fs::create_dir_all(layout.db_path().parent().unwrap()).unwrap();
        std::fs::write(layout.db_path(), b"").unwrap();
        std::fs::write(layout.cursor_path(), "c1").unwrap();

        assert!(!layout.prepare().unwrap());
        assert!(layout.db_path().exists());
        assert!(layout.cursor_path().exists());
    }
}
