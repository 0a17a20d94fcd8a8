//! Last consumed remote cursor
//!
//! A single-line file in the instance directory. A missing or empty file
//! means the next delta request starts with a full listing.

use std::path::{Path, PathBuf};

use driftsync_core::domain::DeltaCursor;

use crate::CacheError;

#[derive(Debug, Clone)]
pub struct LastCursor {
    path: PathBuf,
}

impl LastCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self) -> Result<Option<DeltaCursor>, CacheError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(DeltaCursor::new(content.trim().to_string()).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Io {
                path: self.path.display().to_string(),
                source,
            }),
        }
    }

    /// Replaces the stored cursor
    pub async fn set(&self, cursor: &DeltaCursor) -> Result<(), CacheError> {
        tokio::fs::write(&self.path, cursor.as_str())
            .await
            .map_err(|source| CacheError::Io {
                path: self.path.display().to_string(),
                source,
            })?;

        tracing::debug!(cursor = %cursor, "Stored last cursor");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_or_empty_file_means_no_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = LastCursor::new(dir.path().join("last-cursor"));
        assert_eq!(cursor.get().await.unwrap(), None);

        std::fs::write(cursor.path(), "").unwrap();
        assert_eq!(cursor.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = LastCursor::new(dir.path().join("last-cursor"));

        cursor.set(&DeltaCursor::new("first-long-cursor".into()).unwrap()).await.unwrap();
        cursor.set(&DeltaCursor::new("c2".into()).unwrap()).await.unwrap();

        assert_eq!(cursor.get().await.unwrap().unwrap().as_str(), "c2");
    }
}
