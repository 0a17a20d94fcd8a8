//! Remote delta fetcher
//!
//! Pages through the remote change stream from the last stored cursor and
//! folds the raw events into one [`GroupedChange`] per remote node.
//!
//! ## Rules
//!
//! - Within one fetch the latest event for an id wins: a create after a
//!   delete cancels the delete, a delete after a create replaces it.
//! - Events for ignored subtrees (selective sync) are dropped.
//! - A page flagged `reset` for a request that carried a cursor is fatal:
//!   the stored state no longer matches the stream and must be rebuilt.
//! - Directories flagged `download_original` are listed again by id so
//!   their whole subtree is reported as created.

use std::collections::HashMap;
use std::sync::Arc;

use driftsync_core::domain::{DeltaCursor, IgnoredNode};
use driftsync_core::ports::{
    DeltaRequest, IIgnoreStore, INodeStore, IRemoteService, RemoteDeltaNode,
};
use tracing::{debug, info, instrument, warn};

use crate::context::SyncContext;
use crate::SyncError;

/// Net change of one remote node within a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedChange {
    pub id: String,
    pub directory: bool,
    /// Latest state when the node exists remotely
    pub create: Option<RemoteDeltaNode>,
    /// Set when the node's latest event is a deletion
    pub delete: Option<RemoteDeltaNode>,
}

impl GroupedChange {
    /// Remote id of the containing collection; empty at the root
    pub fn remote_parent(&self) -> String {
        self.create
            .as_ref()
            .and_then(|c| c.parent.clone())
            .unwrap_or_default()
    }
}

/// Grouped changes in the order their ids first appeared
#[derive(Debug, Default)]
pub struct GroupedDelta {
    changes: Vec<GroupedChange>,
    index: HashMap<String, usize>,
}

impl GroupedDelta {
    pub fn add(&mut self, node: RemoteDeltaNode) {
        let slot = match self.index.get(&node.id) {
            Some(&i) => i,
            None => {
                self.index.insert(node.id.clone(), self.changes.len());
                self.changes.push(GroupedChange {
                    id: node.id.clone(),
                    directory: node.directory,
                    create: None,
                    delete: None,
                });
                self.changes.len() - 1
            }
        };

        let change = &mut self.changes[slot];
        change.directory = node.directory;
        if node.deleted {
            change.create = None;
            change.delete = Some(node);
        } else {
            change.delete = None;
            change.create = Some(node);
        }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn into_changes(self) -> Vec<GroupedChange> {
        self.changes
    }
}

/// Result of one fetch
#[derive(Debug, Default)]
pub struct RemoteDelta {
    /// Cursor to store once the pass completed
    pub cursor: Option<DeltaCursor>,
    pub changes: GroupedDelta,
}

/// Fetches and groups the remote change stream
pub struct RemoteDeltaFetcher {
    remote: Arc<dyn IRemoteService>,
    nodes: Arc<dyn INodeStore>,
    ignored: Arc<dyn IIgnoreStore>,
}

impl RemoteDeltaFetcher {
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            remote: ctx.remote.clone(),
            nodes: ctx.nodes.clone(),
            ignored: ctx.ignored.clone(),
        }
    }

    /// Changes since `cursor`, plus full listings of directories to restore
    #[instrument(skip(self, cursor), fields(cursor = ?cursor.as_ref().map(DeltaCursor::as_str)))]
    pub async fn fetch(&self, cursor: Option<DeltaCursor>) -> Result<RemoteDelta, SyncError> {
        let ignored = self.ignored.all().await?;
        let mut delta = RemoteDelta::default();

        delta.cursor = self
            .fetch_pages(DeltaRequest::Cursor(cursor), &ignored, &mut delta.changes)
            .await?;

        for dir in self.nodes.download_original_directories().await? {
            let Some(remote_id) = dir.remote_id.clone() else {
                warn!(path = %dir.path(), "Directory to restore has no remote id");
                continue;
            };
            info!(path = %dir.path(), remote_id = %remote_id, "Listing directory to restore");
            self.fetch_pages(DeltaRequest::Node(remote_id), &ignored, &mut delta.changes)
                .await?;
        }

        info!(changes = delta.changes.len(), "Remote delta fetched");
        Ok(delta)
    }

    /// Follows `has_more` until the stream is exhausted; returns the last cursor
    async fn fetch_pages(
        &self,
        first: DeltaRequest,
        ignored: &[IgnoredNode],
        changes: &mut GroupedDelta,
    ) -> Result<Option<DeltaCursor>, SyncError> {
        let mut request = first;

        loop {
            let page = self.remote.node_delta(&request).await?;
            let sent_cursor = matches!(request, DeltaRequest::Cursor(Some(_)));
            if page.reset && sent_cursor {
                return Err(SyncError::RemoteReset);
            }

            debug!(nodes = page.nodes.len(), has_more = page.has_more, "Got delta page");
            for node in page.nodes {
                if is_ignored(ignored, &node) {
                    debug!(path = %node.path, "Dropping change below ignored node");
                    continue;
                }
                changes.add(node);
            }

            match (page.has_more, page.cursor) {
                (true, Some(cursor)) => request = DeltaRequest::Cursor(Some(cursor)),
                (true, None) => {
                    warn!("Delta page announced more data without a cursor");
                    return Ok(None);
                }
                (false, cursor) => return Ok(cursor),
            }
        }
    }
}

fn is_ignored(ignored: &[IgnoredNode], node: &RemoteDeltaNode) -> bool {
    ignored
        .iter()
        .any(|i| i.remote_id == node.id || i.covers(&node.path))
}
