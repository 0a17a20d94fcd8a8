//! Node record
//!
//! One record per filesystem entry known to the engine, whether it exists
//! locally, remotely or on both sides. The `(parent, name)` pair is the local
//! path key; `ino` ties the record to a local file across renames, and
//! `remote_id` ties it to the remote node.
//!
//! Root children have `parent == "/"`, no `local_parent`, and
//! `remote_parent == ""` ([`REMOTE_ROOT`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::actions::{LocalActions, RemoteActions};
use super::newtypes::NodeId;
use super::path::{join_path, ROOT};

/// Remote id of the root collection
pub const REMOTE_ROOT: &str = "";

/// Metadata of a local filesystem entry, as returned by `lstat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Stable per-file identifier (inode number)
    pub ino: u64,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub ctime: DateTime<Utc>,
}

/// A synchronized filesystem entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Local path of the containing directory
    pub parent: String,
    pub directory: bool,
    /// Local inode; `None` until the node exists on disk
    pub ino: Option<u64>,
    pub remote_id: Option<String>,
    pub remote_parent: Option<String>,
    /// Record of the containing directory; `None` for root children
    pub local_parent: Option<NodeId>,
    pub hash: Option<String>,
    pub version: Option<String>,
    pub size: Option<u64>,
    pub mtime: Option<DateTime<Utc>>,
    pub ctime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub local_actions: LocalActions,
    #[serde(default)]
    pub remote_actions: RemoteActions,
    /// Directory whose subtree must be fetched again from remote
    #[serde(default)]
    pub download_original: bool,
}

impl Node {
    /// Creates a record with a fresh id and no identity on either side
    pub fn new(name: impl Into<String>, parent: impl Into<String>, directory: bool) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            parent: parent.into(),
            directory,
            ino: None,
            remote_id: None,
            remote_parent: None,
            local_parent: None,
            hash: None,
            version: None,
            size: None,
            mtime: None,
            ctime: None,
            local_actions: LocalActions::default(),
            remote_actions: RemoteActions::default(),
            download_original: false,
        }
    }

    /// Local path of this node
    pub fn path(&self) -> String {
        join_path(&self.parent, &self.name)
    }

    pub fn is_root_child(&self) -> bool {
        self.parent == ROOT
    }

    pub fn has_actions(&self) -> bool {
        !self.local_actions.is_empty() || !self.remote_actions.is_empty()
    }

    /// True when either side wants this node gone
    pub fn has_pending_delete(&self) -> bool {
        self.local_actions.delete.is_some() || self.remote_actions.delete.is_some()
    }

    /// Copies timestamps and size from a fresh `lstat`
    pub fn apply_stat(&mut self, stat: &FileStat) {
        self.ctime = Some(stat.ctime);
        self.mtime = Some(stat.mtime);
        self.size = Some(stat.size);
    }

    /// Restores the name and parent recorded before a local rename or move
    pub fn revert_local_rename_move(&mut self) {
        if let Some(rename) = &self.local_actions.rename {
            self.name = rename.old_name.clone();
        }
        if let Some(moved) = &self.local_actions.move_ {
            self.parent = moved.old_parent.clone();
        }
    }

    /// Marks this node as a child of the root on both sides
    pub fn attach_to_root(&mut self) {
        self.remote_parent = Some(REMOTE_ROOT.to_string());
        self.local_parent = None;
    }

    /// Links this node to the record of its containing directory
    pub fn attach_to(&mut self, parent: &Node) {
        self.remote_parent = parent.remote_id.clone();
        self.local_parent = Some(parent.id);
    }
}
