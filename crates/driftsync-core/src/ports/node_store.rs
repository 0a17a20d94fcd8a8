//! Node store port (driven/secondary port)
//!
//! Persistent collection of node records with the lookups the scanner, the
//! delta applier and the queue handlers need, plus the depth-first tree walk
//! used to schedule work.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - `update` owns the cascading path rewrite: when a directory's path
//!   changes, every descendant's `parent` is rewritten as part of the same
//!   call. Implementations must serialize updates so that no reader observes
//!   a half-rewritten subtree.
//! - Subtree queries return whole records; callers filter on action slots
//!   in Rust rather than through a query language.

use crate::domain::{path::ROOT, Node, NodeId};

/// Traversal switches for [`INodeStore::walk_tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// Visit files as well as directories
    pub include_files: bool,
    /// Do not descend below a directory carrying a pending delete on either side
    pub stop_on_pending_delete: bool,
}

impl WalkOptions {
    /// Directories only, descending everywhere
    pub fn directories() -> Self {
        Self {
            include_files: false,
            stop_on_pending_delete: false,
        }
    }

    /// Every node, skipping subtrees that are about to disappear
    pub fn removals() -> Self {
        Self {
            include_files: true,
            stop_on_pending_delete: true,
        }
    }

    fn descends_into(&self, node: &Node) -> bool {
        if !node.directory {
            return false;
        }
        !(self.stop_on_pending_delete && node.has_pending_delete())
    }
}

/// Callback for [`INodeStore::walk_tree`]
///
/// Receives each node together with its parent (`None` for root children).
/// The visitor may mutate the store; children are listed after the visit.
#[async_trait::async_trait]
pub trait NodeVisitor: Send {
    async fn visit(&mut self, node: Node, parent: Option<&Node>) -> anyhow::Result<()>;
}

/// Port trait for node record persistence
#[async_trait::async_trait]
pub trait INodeStore: Send + Sync {
    // --- Lookups ---

    /// Looks up a record by its store-local id
    async fn find_by_id(&self, id: &NodeId) -> anyhow::Result<Option<Node>>;

    /// Looks up the record at a local path
    async fn find_by_path(&self, path: &str) -> anyhow::Result<Option<Node>>;

    /// Looks up a record at a local path other than `exclude`
    async fn find_by_path_excluding(
        &self,
        path: &str,
        exclude: &NodeId,
    ) -> anyhow::Result<Option<Node>>;

    async fn find_by_remote_id(&self, remote_id: &str) -> anyhow::Result<Option<Node>>;

    async fn find_by_ino(&self, ino: u64) -> anyhow::Result<Option<Node>>;

    /// Direct children owned by `id` through `local_parent`
    async fn find_by_local_parent(&self, id: &NodeId) -> anyhow::Result<Vec<Node>>;

    /// Records whose `parent` field equals `parent`, optionally directories only
    async fn find_by_parent_path(
        &self,
        parent: &str,
        directories_only: bool,
    ) -> anyhow::Result<Vec<Node>>;

    /// Every record below `path` (any depth), plus the record at `path` itself
    /// unless `exclude_self`
    async fn query_children_by_path(
        &self,
        path: &str,
        exclude_self: bool,
    ) -> anyhow::Result<Vec<Node>>;

    async fn directories(&self) -> anyhow::Result<Vec<Node>>;

    async fn files(&self) -> anyhow::Result<Vec<Node>>;

    /// Files with pending actions on either side, ordered by parent then name
    async fn files_with_actions(&self) -> anyhow::Result<Vec<Node>>;

    /// Directories flagged for a full re-fetch from remote
    async fn download_original_directories(&self) -> anyhow::Result<Vec<Node>>;

    /// Records with pending actions on either side
    async fn nodes_with_actions(&self) -> anyhow::Result<Vec<Node>>;

    async fn count(&self) -> anyhow::Result<u64>;

    // --- Mutations ---

    async fn create(&self, node: &Node) -> anyhow::Result<()>;

    /// Replaces the stored record, rewriting descendant paths if a directory moved
    ///
    /// Descendants are matched by `local_parent == node.id` or, when the node
    /// has a remote id, by `remote_parent == node.remote_id`. Updating a record
    /// that no longer exists is a no-op.
    async fn update(&self, node: &Node) -> anyhow::Result<()>;

    /// Removes exactly one record
    async fn remove(&self, id: &NodeId) -> anyhow::Result<()>;

    /// Removes a record and, for directories, all records it owns (recursively)
    async fn delete(&self, id: &NodeId) -> anyhow::Result<()>;

    /// Removes all records owned by `id` (recursively), keeping `id` itself
    async fn delete_children(&self, id: &NodeId) -> anyhow::Result<()>;

    /// Removes records without remote identity, or without local presence
    /// unless they await a re-fetch. Returns the number removed.
    async fn purge_transient(&self) -> anyhow::Result<u64>;

    /// Clears both action sets on every record. Returns the number touched.
    async fn clear_actions(&self) -> anyhow::Result<u64>;

    // --- Traversal ---

    /// Depth-first, parent-before-children traversal below `root`
    ///
    /// `None` starts at the sync root. Siblings are visited in store order;
    /// each directory's children are listed right after the directory itself
    /// was visited. Whether to descend is decided on the record as it was
    /// before the visit.
    async fn walk_tree(
        &self,
        root: Option<&Node>,
        options: WalkOptions,
        visitor: &mut dyn NodeVisitor,
    ) -> anyhow::Result<()> {
        let root_path = root.map_or_else(|| ROOT.to_string(), Node::path);
        let mut first = self
            .find_by_parent_path(&root_path, !options.include_files)
            .await?;
        first.reverse();

        // (node, parent) pairs; the parent travels along so the visitor sees it
        let mut stack: Vec<(Node, Option<Node>)> = first
            .into_iter()
            .map(|n| (n, root.cloned()))
            .collect();

        while let Some((node, parent)) = stack.pop() {
            let descend = options.descends_into(&node);
            visitor.visit(node.clone(), parent.as_ref()).await?;

            if descend {
                let mut children = self
                    .find_by_parent_path(&node.path(), !options.include_files)
                    .await?;
                children.reverse();
                stack.extend(children.into_iter().map(|c| (c, Some(node.clone()))));
            }
        }

        Ok(())
    }
}
