//! Pending actions attached to a node
//!
//! A node carries two independent action sets: what changed on the local
//! filesystem since the last pass (`LocalActions`) and what the remote change
//! stream reported (`RemoteActions`). Each slot holds the moment the change was
//! first observed plus the data needed to replay it.
//!
//! ## Invariants
//!
//! - `LocalActions::create` and `LocalActions::delete` are never both set
//! - `LocalActions::delete` is never combined with another local action
//!
//! [`LocalActions::validate`] checks both; the engine refuses to schedule a
//! node that breaks them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Local actions
// ============================================================================

/// New local node, or changed content of an existing file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCreate {
    /// Must run before deferred work of the same kind
    #[serde(default)]
    pub immediate: bool,
    pub initialized: DateTime<Utc>,
}

impl LocalCreate {
    pub fn new(immediate: bool) -> Self {
        Self {
            immediate,
            initialized: Utc::now(),
        }
    }
}

/// Local rename; the node's `name` already holds the new name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRename {
    pub old_name: String,
    pub initialized: DateTime<Utc>,
}

impl LocalRename {
    pub fn new(old_name: impl Into<String>) -> Self {
        Self {
            old_name: old_name.into(),
            initialized: Utc::now(),
        }
    }
}

/// Local move; the node's `parent` already holds the new parent path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMove {
    pub old_parent: String,
    pub initialized: DateTime<Utc>,
}

impl LocalMove {
    pub fn new(old_parent: impl Into<String>) -> Self {
        Self {
            old_parent: old_parent.into(),
            initialized: Utc::now(),
        }
    }
}

/// Node vanished locally (or its path now holds a different inode)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDelete {
    #[serde(default)]
    pub immediate: bool,
    pub initialized: DateTime<Utc>,
}

impl LocalDelete {
    pub fn new(immediate: bool) -> Self {
        Self {
            immediate,
            initialized: Utc::now(),
        }
    }
}

/// Changes discovered by scanning the local filesystem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalActions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<LocalCreate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename: Option<LocalRename>,
    #[serde(rename = "move", default, skip_serializing_if = "Option::is_none")]
    pub move_: Option<LocalMove>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<LocalDelete>,
}

impl LocalActions {
    /// Only a delete action
    pub fn deleted(immediate: bool) -> Self {
        Self {
            delete: Some(LocalDelete::new(immediate)),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of populated slots
    pub fn len(&self) -> usize {
        [
            self.create.is_some(),
            self.rename.is_some(),
            self.move_.is_some(),
            self.delete.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    pub fn has_rename_or_move(&self) -> bool {
        self.rename.is_some() || self.move_.is_some()
    }

    /// Observation time of the pending rename (or, failing that, move)
    pub fn rename_move_initialized(&self) -> Option<DateTime<Utc>> {
        self.rename
            .as_ref()
            .map(|r| r.initialized)
            .or_else(|| self.move_.as_ref().map(|m| m.initialized))
    }

    /// Checks the create/delete exclusivity rules
    ///
    /// Returns the broken rule as a message.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.create.is_some() && self.delete.is_some() {
            return Err("create and delete can not be combined");
        }
        if self.delete.is_some() && self.len() > 1 {
            return Err("delete can not be combined with other actions");
        }
        Ok(())
    }
}

// ============================================================================
// Remote actions
// ============================================================================

/// New remote node or new remote content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCreate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_parent: Option<String>,
    /// Local parent path the remote node maps to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    pub immediate: bool,
    pub initialized: DateTime<Utc>,
}

impl RemoteCreate {
    pub fn new(remote_id: Option<String>) -> Self {
        Self {
            remote_id,
            remote_parent: None,
            parent: None,
            hash: None,
            version: None,
            size: None,
            immediate: false,
            initialized: Utc::now(),
        }
    }
}

/// Remote rename to `remote_name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRename {
    pub remote_id: String,
    pub remote_name: String,
    pub parent: String,
    pub initialized: DateTime<Utc>,
}

/// Remote move below `remote_parent` (local path `parent`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMove {
    pub remote_id: String,
    pub remote_parent: String,
    pub parent: String,
    pub initialized: DateTime<Utc>,
}

/// Node deleted remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDelete {
    pub initialized: DateTime<Utc>,
}

impl RemoteDelete {
    pub fn new() -> Self {
        Self {
            initialized: Utc::now(),
        }
    }
}

impl Default for RemoteDelete {
    fn default() -> Self {
        Self::new()
    }
}

/// Changes reported by the remote change stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteActions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<RemoteCreate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename: Option<RemoteRename>,
    #[serde(rename = "move", default, skip_serializing_if = "Option::is_none")]
    pub move_: Option<RemoteMove>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<RemoteDelete>,
}

impl RemoteActions {
    /// Only a delete action
    pub fn deleted() -> Self {
        Self {
            delete: Some(RemoteDelete::new()),
            ..Self::default()
        }
    }

    /// Only a create action
    pub fn created(create: RemoteCreate) -> Self {
        Self {
            create: Some(create),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        [
            self.create.is_some(),
            self.rename.is_some(),
            self.move_.is_some(),
            self.delete.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    pub fn has_rename_or_move(&self) -> bool {
        self.rename.is_some() || self.move_.is_some()
    }

    pub fn rename_move_initialized(&self) -> Option<DateTime<Utc>> {
        self.rename
            .as_ref()
            .map(|r| r.initialized)
            .or_else(|| self.move_.as_ref().map(|m| m.initialized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sets_serialize_to_empty_objects() {
        assert_eq!(serde_json::to_string(&LocalActions::default()).unwrap(), "{}");
        assert_eq!(serde_json::to_string(&RemoteActions::default()).unwrap(), "{}");
    }

    #[test]
    fn move_slot_uses_plain_name() {
        let actions = LocalActions {
            move_: Some(LocalMove::new("/old")),
            ..LocalActions::default()
        };
        let json = serde_json::to_value(&actions).unwrap();
        assert_eq!(json["move"]["old_parent"], "/old");
    }

    #[test]
    fn validate_rejects_create_with_delete() {
        let actions = LocalActions {
            create: Some(LocalCreate::new(false)),
            delete: Some(LocalDelete::new(false)),
            ..LocalActions::default()
        };
        assert!(actions.validate().is_err());
    }

    #[test]
    fn validate_rejects_delete_with_rename() {
        let actions = LocalActions {
            rename: Some(LocalRename::new("a")),
            delete: Some(LocalDelete::new(false)),
            ..LocalActions::default()
        };
        assert_eq!(
            actions.validate(),
            Err("delete can not be combined with other actions")
        );
    }

    #[test]
    fn validate_accepts_lone_delete() {
        assert!(LocalActions::deleted(true).validate().is_ok());
        assert_eq!(LocalActions::deleted(true).len(), 1);
    }

    #[test]
    fn rename_time_wins_over_move_time() {
        let mut actions = RemoteActions::default();
        assert!(actions.rename_move_initialized().is_none());
        let moved = Utc::now() - chrono::Duration::minutes(5);
        actions.move_ = Some(RemoteMove {
            remote_id: "r".into(),
            remote_parent: "p".into(),
            parent: "/".into(),
            initialized: moved,
        });
        assert_eq!(actions.rename_move_initialized(), Some(moved));
        let renamed = Utc::now();
        actions.rename = Some(RemoteRename {
            remote_id: "r".into(),
            remote_name: "n".into(),
            parent: "/".into(),
            initialized: renamed,
        });
        assert_eq!(actions.rename_move_initialized(), Some(renamed));
    }
}
