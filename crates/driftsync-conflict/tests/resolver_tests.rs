//! Integration tests for ConflictResolver

mod common;

use std::sync::Arc;

use chrono::Utc;

use common::{store, MemoryFs, RecordingRemote};
use driftsync_cache::SqliteNodeStore;
use driftsync_conflict::{ConflictError, ConflictNamer, ConflictResolver};
use driftsync_core::domain::{
    LocalActions, LocalCreate, LocalRename, Node, RemoteActions, RemoteCreate, RemoteRename,
};
use driftsync_core::ports::{ILocalFileSystem, INodeStore};

// ============================================================================
// Test helpers
// ============================================================================

struct Harness {
    nodes: Arc<SqliteNodeStore>,
    fs: Arc<MemoryFs>,
    remote: Arc<RecordingRemote>,
    resolver: ConflictResolver,
}

async fn harness() -> Harness {
    let nodes = store().await;
    let fs = Arc::new(MemoryFs::default());
    let remote = Arc::new(RecordingRemote::default());
    let resolver = ConflictResolver::new(
        nodes.clone(),
        fs.clone(),
        remote.clone(),
        ConflictNamer::new("alice"),
    );
    Harness {
        nodes,
        fs,
        remote,
        resolver,
    }
}

fn remote_create(remote_id: &str, hash: Option<&str>, size: Option<u64>) -> RemoteCreate {
    let mut create = RemoteCreate::new(Some(remote_id.to_string()));
    create.remote_parent = Some(String::new());
    create.parent = Some("/".to_string());
    create.hash = hash.map(str::to_string);
    create.version = Some("v1".to_string());
    create.size = size;
    create
}

fn locally_created(name: &str, directory: bool, ino: u64) -> Node {
    let mut node = Node::new(name, "/", directory);
    node.ino = Some(ino);
    node.local_actions.create = Some(LocalCreate::new(false));
    node
}

// ============================================================================
// Directories
// ============================================================================

#[tokio::test]
async fn directory_created_on_both_sides_adopts_remote_identity() {
    let h = harness().await;
    h.fs.add_dir("/docs", 1);
    let mut node = locally_created("docs", true, 1);
    node.remote_actions = RemoteActions::created(remote_create("r-docs", None, None));
    h.nodes.create(&node).await.unwrap();

    h.resolver.resolve(node.clone()).await.unwrap();

    let stored = h.nodes.find_by_id(&node.id).await.unwrap().unwrap();
    assert_eq!(stored.remote_id.as_deref(), Some("r-docs"));
    assert_eq!(stored.remote_parent.as_deref(), Some(""));
    assert!(!stored.has_actions());
}

#[tokio::test]
async fn directory_renamed_on_both_sides_keeps_remote_rename() {
    let h = harness().await;
    let mut node = Node::new("mine", "/", true);
    node.ino = Some(2);
    node.remote_id = Some("r-dir".into());
    node.local_actions.rename = Some(LocalRename::new("dir"));
    node.remote_actions.rename = Some(RemoteRename {
        remote_id: "r-dir".into(),
        remote_name: "theirs".into(),
        parent: "/".into(),
        initialized: Utc::now(),
    });
    h.fs.add_dir("/mine", 2);
    h.nodes.create(&node).await.unwrap();

    h.resolver.resolve(node.clone()).await.unwrap();

    let stored = h.nodes.find_by_id(&node.id).await.unwrap().unwrap();
    assert!(stored.local_actions.rename.is_none());
    assert_eq!(
        stored.remote_actions.rename.map(|r| r.remote_name),
        Some("theirs".to_string())
    );
}

#[tokio::test]
async fn remote_create_cancels_local_delete_of_directory() {
    let h = harness().await;
    let mut node = Node::new("keep", "/", true);
    node.remote_id = Some("r-keep".into());
    node.local_actions = LocalActions::deleted(false);
    node.remote_actions = RemoteActions::created(remote_create("r-keep", None, None));
    h.nodes.create(&node).await.unwrap();

    h.resolver.resolve(node.clone()).await.unwrap();

    let stored = h.nodes.find_by_id(&node.id).await.unwrap().unwrap();
    assert!(stored.local_actions.is_empty());
    assert!(stored.remote_actions.create.is_some());
}

// ============================================================================
// Files
// ============================================================================

#[tokio::test]
async fn file_created_on_both_sides_with_equal_content_is_merged() {
    let h = harness().await;
    h.fs.add_file("/a.txt", 7, "abc123", 3);
    let mut node = locally_created("a.txt", false, 7);
    node.remote_actions = RemoteActions::created(remote_create("r-a", Some("abc123"), Some(3)));
    h.nodes.create(&node).await.unwrap();

    h.resolver.resolve(node.clone()).await.unwrap();

    assert_eq!(h.nodes.count().await.unwrap(), 1);
    let stored = h.nodes.find_by_id(&node.id).await.unwrap().unwrap();
    assert!(!stored.has_actions());
    assert_eq!(stored.remote_id.as_deref(), Some("r-a"));
    assert_eq!(stored.hash.as_deref(), Some("abc123"));
    assert_eq!(stored.version.as_deref(), Some("v1"));
    assert_eq!(stored.size, Some(3));
}

#[tokio::test]
async fn file_created_on_both_sides_with_different_content_keeps_both() {
    let h = harness().await;
    h.fs.add_file("/a.txt", 7, "local-hash", 5);
    let mut node = locally_created("a.txt", false, 7);
    node.remote_actions = RemoteActions::created(remote_create("r-a", Some("remote-hash"), Some(9)));
    h.nodes.create(&node).await.unwrap();

    h.resolver.resolve(node.clone()).await.unwrap();

    assert_eq!(h.nodes.count().await.unwrap(), 2);

    // the local copy moved aside and still waits to be uploaded
    let local = h.nodes.find_by_id(&node.id).await.unwrap().unwrap();
    assert!(local.name.starts_with("a-conflict-alice-"));
    assert!(local.name.ends_with(".txt"));
    assert!(local.local_actions.create.is_some());
    assert!(local.remote_actions.is_empty());
    assert!(local.remote_id.is_none());
    assert_eq!(h.fs.paths(), vec![local.path()]);

    // the remote version takes over the original path
    let remote = h.nodes.find_by_path("/a.txt").await.unwrap().unwrap();
    assert_ne!(remote.id, node.id);
    let create = remote.remote_actions.create.unwrap();
    assert_eq!(create.remote_id.as_deref(), Some("r-a"));
    assert_eq!(create.hash.as_deref(), Some("remote-hash"));
}

#[tokio::test]
async fn file_deleted_on_both_sides_is_dropped() {
    let h = harness().await;
    let mut node = Node::new("gone.txt", "/", false);
    node.remote_id = Some("r-gone".into());
    node.local_actions = LocalActions::deleted(false);
    node.remote_actions = RemoteActions::deleted();
    h.nodes.create(&node).await.unwrap();

    h.resolver.resolve(node.clone()).await.unwrap();

    assert!(h.nodes.find_by_id(&node.id).await.unwrap().is_none());
}

// ============================================================================
// Target path occupants
// ============================================================================

#[tokio::test]
async fn local_occupant_of_remote_target_is_renamed() {
    let h = harness().await;
    h.fs.add_file("/report.txt", 3, "local", 5);
    let mut occupant = Node::new("report.txt", "/", false);
    occupant.ino = Some(3);
    occupant.remote_id = Some("r-local".into());
    h.nodes.create(&occupant).await.unwrap();

    let mut incoming = Node::new("report.txt", "/", false);
    incoming.remote_id = Some("r-incoming".into());
    incoming.remote_actions = RemoteActions::created(remote_create("r-incoming", Some("x"), Some(1)));
    h.nodes.create(&incoming).await.unwrap();

    h.resolver.resolve(incoming.clone()).await.unwrap();

    let renamed = h.nodes.find_by_id(&occupant.id).await.unwrap().unwrap();
    assert!(renamed.name.starts_with("report-conflict-alice-"));
    assert_eq!(
        renamed.local_actions.rename.map(|r| r.old_name),
        Some("report.txt".to_string())
    );
    assert!(h.fs.stat("/report.txt").await.unwrap().is_none());
    assert!(h.remote.renames.lock().unwrap().is_empty());
}

#[tokio::test]
async fn remote_node_is_renamed_when_local_occupant_cannot_move() {
    let h = harness().await;
    h.fs.add_file("/b.txt", 5, "occupant", 1);
    h.fs.add_file("/a.txt", 6, "mine", 1);
    h.fs.fail_renames_from("/b.txt");

    let mut occupant = Node::new("b.txt", "/", false);
    occupant.ino = Some(5);
    h.nodes.create(&occupant).await.unwrap();

    let mut node = Node::new("a.txt", "/", false);
    node.ino = Some(6);
    node.remote_id = Some("r-a".into());
    node.remote_actions.rename = Some(RemoteRename {
        remote_id: "r-a".into(),
        remote_name: "b.txt".into(),
        parent: "/".into(),
        initialized: Utc::now(),
    });
    h.nodes.create(&node).await.unwrap();

    h.resolver.resolve(node.clone()).await.unwrap();

    let stored = h.nodes.find_by_id(&node.id).await.unwrap().unwrap();
    assert!(stored.name.starts_with("b-conflict-remote-"));
    assert!(stored.remote_actions.rename.is_none());

    let renames = h.remote.renames.lock().unwrap().clone();
    assert_eq!(renames, vec![("r-a".to_string(), stored.name.clone())]);
    assert!(h.fs.stat(&stored.path()).await.unwrap().is_some());
}

#[tokio::test]
async fn untracked_occupant_is_an_error() {
    let h = harness().await;
    h.fs.add_file("/stray.txt", 99, "x", 1);
    let mut node = Node::new("stray.txt", "/", false);
    node.remote_actions = RemoteActions::created(remote_create("r-s", Some("y"), Some(1)));
    h.nodes.create(&node).await.unwrap();

    let err = h.resolver.resolve(node).await.unwrap_err();
    assert!(matches!(err, ConflictError::UntrackedOccupant { ino: 99, .. }));
}
