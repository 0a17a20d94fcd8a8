//! Delta stage
//!
//! Runs the local scan and the remote fetch side by side, then merges the
//! grouped remote changes into the node records as `remote_actions` and
//! resolves nodes that changed on both sides.
//!
//! ## Merge rules
//!
//! - Creates whose name is excluded are dropped.
//! - Changes for known remote ids are applied first; creates for unknown ids
//!   are applied last so their parent collections already have records.
//! - A known node gets a move when its remote parent changed, a rename when
//!   its name changed (unless the local side renamed it to that name), and
//!   a create when the file content (hash or version) changed.
//! - An unknown remote node that lands on a path held by a record with no
//!   pending local delete is attached to that record; otherwise a new record
//!   is created.

use std::sync::Arc;

use chrono::Utc;
use driftsync_conflict::ConflictResolver;
use driftsync_core::domain::path::{is_excluded, name_of, parent_of, ROOT};
use driftsync_core::domain::{
    DeltaCursor, Node, RemoteActions, RemoteCreate, RemoteDelete, RemoteMove, RemoteRename,
};
use driftsync_core::ports::{INodeStore, RemoteDeltaNode};
use tracing::{debug, info, instrument};

use crate::context::SyncContext;
use crate::local_delta::LocalDeltaScanner;
use crate::remote_delta::{GroupedChange, RemoteDeltaFetcher};
use crate::SyncError;

/// Runs both scans and merges their results
///
/// Returns the cursor to store once the pass completes.
#[instrument(skip_all)]
pub async fn run_delta(ctx: &SyncContext) -> Result<Option<DeltaCursor>, SyncError> {
    let cursor = ctx.cursor.get().await?;
    let scanner = LocalDeltaScanner::new(ctx);
    let fetcher = RemoteDeltaFetcher::new(ctx);

    let ((), remote) = tokio::try_join!(scanner.scan(), fetcher.fetch(cursor))?;

    DeltaApplier::new(ctx)
        .apply(remote.changes.into_changes())
        .await?;
    Ok(remote.cursor)
}

/// Merges grouped remote changes into node records
pub struct DeltaApplier {
    nodes: Arc<dyn INodeStore>,
    resolver: ConflictResolver,
}

impl DeltaApplier {
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            nodes: ctx.nodes.clone(),
            resolver: ConflictResolver::new(
                ctx.nodes.clone(),
                ctx.fs.clone(),
                ctx.remote.clone(),
                ctx.namer(),
            ),
        }
    }

    pub async fn apply(&self, changes: Vec<GroupedChange>) -> Result<(), SyncError> {
        info!(changes = changes.len(), "Applying remote delta");
        let mut unknown = Vec::new();

        for change in changes {
            if let Some(create) = &change.create {
                if is_excluded(name_of(&create.path)) {
                    debug!(path = %create.path, "Skipping excluded remote node");
                    continue;
                }
            }

            match self.nodes.find_by_remote_id(&change.id).await? {
                Some(node) => {
                    if let Some(node) = self.apply_known(&change, node).await? {
                        self.resolver.resolve(node).await?;
                    }
                }
                None if change.create.is_some() => unknown.push(change),
                None => debug!(remote_id = %change.id, "Delete of an unknown remote node"),
            }
        }

        for change in unknown {
            if let Some(node) = self.apply_unknown(&change).await? {
                self.resolver.resolve(node).await?;
            }
        }

        Ok(())
    }

    async fn apply_known(&self, change: &GroupedChange, mut node: Node) -> Result<Option<Node>, SyncError> {
        let Some(create) = &change.create else {
            if change.delete.is_some() {
                debug!(path = %node.path(), "Node deleted remotely");
                node.remote_actions = RemoteActions::deleted();
                self.nodes.update(&node).await?;
                return Ok(Some(node));
            }
            return Ok(None);
        };

        let name = name_of(&create.path).to_string();
        let parent = parent_of(&create.path).to_string();
        let remote_parent = change.remote_parent();
        node.remote_actions = RemoteActions::default();

        if node.remote_parent.as_deref() != Some(remote_parent.as_str()) {
            debug!(path = %node.path(), to = %parent, "Node moved remotely");
            node.remote_actions.move_ = Some(RemoteMove {
                remote_id: change.id.clone(),
                remote_parent: remote_parent.clone(),
                parent: parent.clone(),
                initialized: Utc::now(),
            });
        }

        let renamed_locally_to_it = node
            .local_actions
            .rename
            .as_ref()
            .is_some_and(|r| r.old_name == name);
        if node.name != name && !renamed_locally_to_it {
            debug!(path = %node.path(), to = %name, "Node renamed remotely");
            node.remote_actions.rename = Some(RemoteRename {
                remote_id: change.id.clone(),
                remote_name: name,
                parent: parent.clone(),
                initialized: Utc::now(),
            });
        }

        if !change.directory && (node.hash != create.hash || node.version != create.version) {
            debug!(path = %node.path(), "File content changed remotely");
            node.remote_actions.create = Some(remote_create(change, create, remote_parent, parent));
        } else if change.directory && node.download_original {
            let mut restore = remote_create(change, create, remote_parent, parent);
            restore.hash = None;
            node.remote_actions.create = Some(restore);
            node.download_original = false;
        }

        self.nodes.update(&node).await?;
        Ok(Some(node))
    }

    async fn apply_unknown(&self, change: &GroupedChange) -> Result<Option<Node>, SyncError> {
        let Some(create) = &change.create else {
            return Ok(None);
        };
        let remote_parent = change.remote_parent();
        let parent = parent_of(&create.path).to_string();
        let action = remote_create(change, create, remote_parent.clone(), parent.clone());

        if let Some(mut occupant) = self.nodes.find_by_path(&create.path).await? {
            let takes_over = (occupant.remote_actions.is_empty()
                || occupant.remote_actions.delete.is_some())
                && occupant.local_actions.delete.is_none();

            if takes_over {
                debug!(path = %create.path, "Remote node lands on an existing record");
                occupant.remote_actions = RemoteActions::created(action);
                if change.directory && occupant.local_actions.create.is_none() {
                    occupant.remote_actions.delete = Some(RemoteDelete::new());
                }
                self.nodes.update(&occupant).await?;
                return Ok(Some(occupant));
            }
        }

        // the parent collection may have moved locally already
        let local_parent = if remote_parent.is_empty() {
            ROOT.to_string()
        } else {
            self.nodes
                .find_by_remote_id(&remote_parent)
                .await?
                .map(|p| p.path())
                .unwrap_or(parent)
        };

        let mut node = Node::new(name_of(&create.path), local_parent, change.directory);
        node.remote_parent = Some(remote_parent);
        node.remote_actions = RemoteActions::created(action);
        debug!(path = %node.path(), "New remote node");
        self.nodes.create(&node).await?;
        Ok(Some(node))
    }
}

fn remote_create(
    change: &GroupedChange,
    create: &RemoteDeltaNode,
    remote_parent: String,
    parent: String,
) -> RemoteCreate {
    let mut action = RemoteCreate::new(Some(change.id.clone()));
    action.remote_parent = Some(remote_parent);
    action.parent = Some(parent);
    action.hash = create.hash.clone();
    action.version = create.version.clone();
    action.size = create.size;
    action
}
