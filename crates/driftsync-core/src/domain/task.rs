//! Queue tasks and their scheduling priority
//!
//! A task is one unit of apply-work: run a create, a rename/move or a remove
//! on one side, or transfer file content. Lower priority values run first.
//!
//! ## Priority bands
//!
//! | origin | action | immediate | deferred |
//! |--------|--------|-----------|----------|
//! | remote | remove | 0 | 12 |
//! | remote | renamemove | 1 | 2 |
//! | remote | create | 4 | 5 |
//! | local | remove | 20 | 27 |
//! | local | renamemove | 21 | 22 |
//! | local | create | 24 | 25 |
//!
//! Files add 6 to the band, so every directory task of a band runs before the
//! file tasks of the same band.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::node::Node;

/// Offset added to the band of file tasks
pub const FILE_PRIORITY_OFFSET: u8 = 6;

/// Band for a remote rename/move whose new parent did not exist yet
pub const REMOTE_RESCHEDULE_PRIORITY: u8 = 6;

/// Band for a local rename/move whose destination did not exist yet
pub const LOCAL_RESCHEDULE_PRIORITY: u8 = 26;

/// Side a change was observed on; the task applies it to the other side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOrigin {
    Local,
    Remote,
}

impl Display for TaskOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TaskOrigin::Local => write!(f, "local"),
            TaskOrigin::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for TaskOrigin {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(TaskOrigin::Local),
            "remote" => Ok(TaskOrigin::Remote),
            other => Err(DomainError::UnknownVariant {
                kind: "task origin",
                value: other.to_string(),
            }),
        }
    }
}

/// What a task does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskAction {
    Create,
    #[serde(rename = "renamemove")]
    RenameMove,
    Remove,
    Upload,
    Download,
}

impl TaskAction {
    /// Upload and download run on the transfer queue
    pub fn is_transfer(self) -> bool {
        matches!(self, TaskAction::Upload | TaskAction::Download)
    }
}

impl Display for TaskAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskAction::Create => "create",
            TaskAction::RenameMove => "renamemove",
            TaskAction::Remove => "remove",
            TaskAction::Upload => "upload",
            TaskAction::Download => "download",
        };
        write!(f, "{s}")
    }
}

/// A unit of apply-work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub origin: TaskOrigin,
    pub action: TaskAction,
    /// Snapshot of the node when the task was queued; handlers re-read it by id
    pub node: Node,
    /// When the underlying change was first observed
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub immediate: bool,
    pub priority: u8,
}

impl Task {
    /// Creates a deferred task with its default priority
    pub fn new(origin: TaskOrigin, action: TaskAction, node: Node, created: DateTime<Utc>) -> Self {
        let priority = default_priority(origin, action, node.directory, false);
        Self {
            origin,
            action,
            node,
            created,
            immediate: false,
            priority,
        }
    }

    /// Marks the task immediate and moves it into the immediate band
    #[must_use]
    pub fn with_immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self.priority = default_priority(self.origin, self.action, self.node.directory, immediate);
        self
    }

    /// Overrides the computed priority
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Content upload for a node created or changed locally
    pub fn upload(node: Node) -> Self {
        Self::new(TaskOrigin::Local, TaskAction::Upload, node, Utc::now())
    }

    /// Content download for a node created or changed remotely
    pub fn download(node: Node) -> Self {
        Self::new(TaskOrigin::Remote, TaskAction::Download, node, Utc::now())
    }

    /// Local path of the node the task was queued for
    pub fn path(&self) -> String {
        self.node.path()
    }
}

/// Band of a task, before any reschedule
pub fn default_priority(origin: TaskOrigin, action: TaskAction, directory: bool, immediate: bool) -> u8 {
    let band = match (origin, action, immediate) {
        (TaskOrigin::Remote, TaskAction::Remove, true) => 0,
        (TaskOrigin::Remote, TaskAction::RenameMove, true) => 1,
        (TaskOrigin::Remote, TaskAction::RenameMove, false) => 2,
        (TaskOrigin::Remote, TaskAction::Create, true) => 4,
        (TaskOrigin::Remote, TaskAction::Create, false) => 5,
        (TaskOrigin::Remote, TaskAction::Remove, false) => 12,
        (TaskOrigin::Local, TaskAction::Remove, true) => 20,
        (TaskOrigin::Local, TaskAction::RenameMove, true) => 21,
        (TaskOrigin::Local, TaskAction::RenameMove, false) => 22,
        (TaskOrigin::Local, TaskAction::Create, true) => 24,
        (TaskOrigin::Local, TaskAction::Create, false) => 25,
        (TaskOrigin::Local, TaskAction::Remove, false) => 27,
        // transfers are not priority-ordered
        (_, TaskAction::Upload | TaskAction::Download, _) => 0,
    };

    if directory {
        band
    } else {
        band + FILE_PRIORITY_OFFSET
    }
}
