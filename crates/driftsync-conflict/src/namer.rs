//! Conflict naming
//!
//! Generates the names conflicting entries are moved aside to:
//! - local copies: `stem-conflict-<user>-dd.mm.yyyy-HH.MM[ (n)].ext`
//! - remote copies: `stem-conflict-remote-dd.mm.yyyy-HH.MM.ext`
//! - read-only rescue collections: `name-readonlyconflicts`

use chrono::{DateTime, Local};
use driftsync_core::domain::path::{file_name_parts, join_path, with_extension};
use driftsync_core::ports::ILocalFileSystem;

const DATE_FORMAT: &str = "%d.%m.%Y-%H.%M";

/// Generates conflict names
#[derive(Debug, Clone, Default)]
pub struct ConflictNamer {
    username: Option<String>,
}

impl ConflictNamer {
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            username: (!username.is_empty()).then_some(username),
        }
    }

    /// Minute-resolution stamp embedded in conflict names
    pub fn date_stamp(at: DateTime<Local>) -> String {
        at.format(DATE_FORMAT).to_string()
    }

    /// Name of the `attempt`-th local conflict candidate for `name`
    ///
    /// Attempt 0 carries no counter; later attempts append ` (n)` before the
    /// extension.
    pub fn conflict_name(&self, name: &str, stamp: &str, attempt: u32) -> String {
        let (stem, ext) = file_name_parts(name);
        let user = self
            .username
            .as_deref()
            .map(|u| format!("{u}-"))
            .unwrap_or_default();
        let counter = if attempt > 0 {
            format!(" ({attempt})")
        } else {
            String::new()
        };
        with_extension(&format!("{stem}-conflict-{user}{stamp}{counter}"), ext)
    }

    /// First local conflict name for `name` that is free in `parent`
    pub async fn unique_local_name(
        &self,
        fs: &dyn ILocalFileSystem,
        parent: &str,
        name: &str,
    ) -> anyhow::Result<String> {
        let stamp = Self::date_stamp(Local::now());
        let mut attempt = 0;
        loop {
            let candidate = self.conflict_name(name, &stamp, attempt);
            if !fs.exists(&join_path(parent, &candidate)).await? {
                return Ok(candidate);
            }
            attempt += 1;
        }
    }

    /// Name a remote node is renamed to when its local counterpart can't move aside
    pub fn remote_conflict_name(name: &str, stamp: &str) -> String {
        let (stem, ext) = file_name_parts(name);
        with_extension(&format!("{stem}-conflict-remote-{stamp}"), ext)
    }

    /// Name of the local collection that receives changes a read-only share refused
    pub fn readonly_collection_name(name: &str) -> String {
        format!("{name}-readonlyconflicts")
    }

    /// `stem-n.ext`, or `name` itself for n = 0
    pub fn numbered(name: &str, n: u32) -> String {
        if n == 0 {
            return name.to_string();
        }
        let (stem, ext) = file_name_parts(name);
        with_extension(&format!("{stem}-{n}"), ext)
    }

    /// First numbered variant of `name` that is free in `parent`
    pub async fn unique_numbered(
        fs: &dyn ILocalFileSystem,
        parent: &str,
        name: &str,
    ) -> anyhow::Result<String> {
        let mut n = 0;
        loop {
            let candidate = Self::numbered(name, n);
            if !fs.exists(&join_path(parent, &candidate)).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}
