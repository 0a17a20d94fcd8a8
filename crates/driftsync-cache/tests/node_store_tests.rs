//! Integration tests for SqliteNodeStore
//!
//! Each test opens a fresh in-memory database.

use driftsync_cache::{DatabasePool, SqliteNodeStore};
use driftsync_core::domain::{LocalActions, LocalCreate, Node, RemoteActions};
use driftsync_core::ports::{INodeStore, NodeVisitor, WalkOptions};

// ============================================================================
// Test helpers
// ============================================================================

async fn setup() -> SqliteNodeStore {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteNodeStore::new(pool.pool().clone())
}

fn synced(name: &str, parent: &str, directory: bool, ino: u64) -> Node {
    let mut node = Node::new(name, parent, directory);
    node.ino = Some(ino);
    node.remote_id = Some(format!("r-{name}"));
    node
}

/// Creates `/a`, `/a/b`, `/a/b/c.txt` linked through local_parent
async fn create_tree(store: &SqliteNodeStore) -> (Node, Node, Node) {
    let mut a = synced("a", "/", true, 1);
    a.attach_to_root();
    let mut b = synced("b", "/a", true, 2);
    b.attach_to(&a);
    let mut c = synced("c.txt", "/a/b", false, 3);
    c.attach_to(&b);

    store.create(&a).await.unwrap();
    store.create(&b).await.unwrap();
    store.create(&c).await.unwrap();
    (a, b, c)
}

#[derive(Default)]
struct Collect {
    visited: Vec<(String, Option<String>)>,
}

#[async_trait::async_trait]
impl NodeVisitor for Collect {
    async fn visit(&mut self, node: Node, parent: Option<&Node>) -> anyhow::Result<()> {
        self.visited.push((node.path(), parent.map(Node::path)));
        Ok(())
    }
}

// ============================================================================
// Lookups
// ============================================================================

#[tokio::test]
async fn create_and_find_by_every_key() {
    let store = setup().await;
    let (_, _, c) = create_tree(&store).await;

    let by_path = store.find_by_path("/a/b/c.txt").await.unwrap().unwrap();
    assert_eq!(by_path, c);
    assert_eq!(store.find_by_id(&c.id).await.unwrap().unwrap().name, "c.txt");
    assert_eq!(store.find_by_ino(3).await.unwrap().unwrap().id, c.id);
    assert_eq!(
        store.find_by_remote_id("r-c.txt").await.unwrap().unwrap().id,
        c.id
    );
    assert!(store.find_by_path("/").await.unwrap().is_none());
    assert!(store.find_by_path("/missing").await.unwrap().is_none());
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn action_sets_round_trip_through_storage() {
    let store = setup().await;
    let mut node = Node::new("new.txt", "/", false);
    node.local_actions.create = Some(LocalCreate::new(true));
    node.remote_actions = RemoteActions::deleted();
    store.create(&node).await.unwrap();

    let loaded = store.find_by_id(&node.id).await.unwrap().unwrap();
    assert_eq!(loaded.local_actions, node.local_actions);
    assert_eq!(loaded.remote_actions, node.remote_actions);
}

#[tokio::test]
async fn find_by_path_excluding_skips_given_record() {
    let store = setup().await;
    let first = synced("dup.txt", "/", false, 10);
    let second = synced("dup.txt", "/", false, 11);
    store.create(&first).await.unwrap();
    store.create(&second).await.unwrap();

    let other = store
        .find_by_path_excluding("/dup.txt", &first.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(other.id, second.id);
}

#[tokio::test]
async fn query_children_by_path_matches_whole_segments() {
    let store = setup().await;
    create_tree(&store).await;
    store.create(&synced("ab", "/", true, 20)).await.unwrap();
    store.create(&synced("x.txt", "/ab", false, 21)).await.unwrap();

    let mut with_self: Vec<String> = store
        .query_children_by_path("/a", false)
        .await
        .unwrap()
        .iter()
        .map(Node::path)
        .collect();
    with_self.sort();
    assert_eq!(with_self, vec!["/a", "/a/b", "/a/b/c.txt"]);

    let without_self = store.query_children_by_path("/a", true).await.unwrap();
    assert_eq!(without_self.len(), 2);
    assert!(without_self.iter().all(|n| n.path() != "/a"));
}

#[tokio::test]
async fn files_with_actions_are_ordered_by_parent_then_name() {
    let store = setup().await;
    for (name, parent) in [("z.txt", "/b"), ("y.txt", "/a"), ("x.txt", "/b"), ("quiet.txt", "/a")] {
        let mut node = synced(name, parent, false, 0);
        if name != "quiet.txt" {
            node.local_actions.create = Some(LocalCreate::new(false));
        }
        store.create(&node).await.unwrap();
    }

    let paths: Vec<String> = store
        .files_with_actions()
        .await
        .unwrap()
        .iter()
        .map(Node::path)
        .collect();
    assert_eq!(paths, vec!["/a/y.txt", "/b/x.txt", "/b/z.txt"]);
}

// ============================================================================
// Cascading update
// ============================================================================

#[tokio::test]
async fn renaming_a_directory_rewrites_descendant_paths() {
    let store = setup().await;
    let (mut a, b, c) = create_tree(&store).await;

    a.name = "a2".to_string();
    store.update(&a).await.unwrap();

    let children = store.find_by_local_parent(&a.id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].parent, "/a2");
    assert_eq!(store.find_by_id(&b.id).await.unwrap().unwrap().parent, "/a2");
    assert_eq!(
        store.find_by_id(&c.id).await.unwrap().unwrap().parent,
        "/a2/b"
    );
    assert!(store.find_by_path("/a2/b/c.txt").await.unwrap().is_some());
}

#[tokio::test]
async fn cascade_follows_remote_ownership() {
    let store = setup().await;
    let mut dir = synced("remote-dir", "/", true, 1);
    dir.attach_to_root();
    store.create(&dir).await.unwrap();

    // created by the delta applier: only the remote link is known
    let mut child = Node::new("f.txt", "/remote-dir", false);
    child.remote_parent = dir.remote_id.clone();
    store.create(&child).await.unwrap();

    dir.parent = "/moved".to_string();
    store.update(&dir).await.unwrap();

    assert_eq!(
        store.find_by_id(&child.id).await.unwrap().unwrap().parent,
        "/moved/remote-dir"
    );
}

#[tokio::test]
async fn cascade_leaves_unrelated_records_alone() {
    let store = setup().await;
    let (mut a, _, _) = create_tree(&store).await;
    // same parent path, but owned by nobody
    let stray = Node::new("stray.txt", "/a", false);
    store.create(&stray).await.unwrap();

    a.name = "renamed".to_string();
    store.update(&a).await.unwrap();

    assert_eq!(store.find_by_id(&stray.id).await.unwrap().unwrap().parent, "/a");
}

#[tokio::test]
async fn update_of_removed_record_is_a_no_op() {
    let store = setup().await;
    let node = synced("gone.txt", "/", false, 5);
    store.update(&node).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
}

// ============================================================================
// Removal
// ============================================================================

#[tokio::test]
async fn delete_removes_subtree_but_remove_only_the_record() {
    let store = setup().await;
    let (a, b, c) = create_tree(&store).await;

    store.remove(&b.id).await.unwrap();
    assert!(store.find_by_id(&b.id).await.unwrap().is_none());
    assert!(store.find_by_id(&c.id).await.unwrap().is_some());

    store.delete(&a.id).await.unwrap();
    assert!(store.find_by_id(&a.id).await.unwrap().is_none());
    // c was owned by b, which no longer exists, so it survives
    assert!(store.find_by_id(&c.id).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_children_keeps_the_parent() {
    let store = setup().await;
    let (a, _, _) = create_tree(&store).await;

    store.delete_children(&a.id).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
    assert!(store.find_by_id(&a.id).await.unwrap().is_some());
}

#[tokio::test]
async fn purge_transient_and_clear_actions() {
    let store = setup().await;
    let mut kept = synced("kept.txt", "/", false, 1);
    kept.local_actions = LocalActions::deleted(false);
    let unsynced = Node::new("local-only.txt", "/", false);
    let mut not_local = Node::new("remote-only.txt", "/", false);
    not_local.remote_id = Some("r-remote-only".into());
    let mut restoring = Node::new("restore", "/", true);
    restoring.remote_id = Some("r-restore".into());
    restoring.download_original = true;

    for node in [&kept, &unsynced, &not_local, &restoring] {
        store.create(node).await.unwrap();
    }

    assert_eq!(store.purge_transient().await.unwrap(), 2);
    assert_eq!(store.count().await.unwrap(), 2);

    assert_eq!(store.clear_actions().await.unwrap(), 1);
    assert!(store.nodes_with_actions().await.unwrap().is_empty());
}

// ============================================================================
// Tree walk
// ============================================================================

#[tokio::test]
async fn walk_visits_parents_before_children() {
    let store = setup().await;
    create_tree(&store).await;
    store.create(&synced("top.txt", "/", false, 9)).await.unwrap();

    let mut all = Collect::default();
    store
        .walk_tree(
            None,
            WalkOptions {
                include_files: true,
                stop_on_pending_delete: false,
            },
            &mut all,
        )
        .await
        .unwrap();

    let paths: Vec<&str> = all.visited.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(paths, vec!["/a", "/a/b", "/a/b/c.txt", "/top.txt"]);
    assert_eq!(all.visited[0].1, None);
    assert_eq!(all.visited[2].1.as_deref(), Some("/a/b"));

    let mut dirs = Collect::default();
    store
        .walk_tree(None, WalkOptions::directories(), &mut dirs)
        .await
        .unwrap();
    assert_eq!(dirs.visited.len(), 2);
}

#[tokio::test]
async fn walk_stops_below_pending_deletes() {
    let store = setup().await;
    let (mut a, _, _) = create_tree(&store).await;
    a.remote_actions = RemoteActions::deleted();
    store.update(&a).await.unwrap();

    let mut visitor = Collect::default();
    store
        .walk_tree(None, WalkOptions::removals(), &mut visitor)
        .await
        .unwrap();

    assert_eq!(visitor.visited.len(), 1);
    assert_eq!(visitor.visited[0].0, "/a");
}
