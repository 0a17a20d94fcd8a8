//! Node delta requests
//!
//! `GET /node/delta` returns one page of the change stream:
//!
//! ```json
//! {"data": {"reset": false, "cursor": "...", "has_more": true, "nodes": [...]}}
//! ```
//!
//! A page is requested either with the last cursor (incremental listing, or a
//! full one when there is none) or with `id=` for the full subtree of one
//! collection.

use driftsync_core::domain::DeltaCursor;
use driftsync_core::ports::{ApiError, DeltaRequest, RemoteDeltaNode, RemoteDeltaPage};
use serde::Deserialize;
use tracing::debug;

use crate::client::ApiClient;
use crate::wire::{opt_string, truthy};

/// Attributes requested per delta node on top of id, path, directory and deleted
const DELTA_ATTRIBUTES: [&str; 4] = ["parent", "hash", "version", "size"];

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireDeltaPage {
    #[serde(default)]
    reset: bool,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    nodes: Vec<WireDeltaNode>,
}

/// `deleted` is `false` or the deletion timestamp
#[derive(Debug, Deserialize)]
struct WireDeltaNode {
    id: String,
    path: String,
    #[serde(default, deserialize_with = "opt_string")]
    parent: Option<String>,
    #[serde(default)]
    directory: bool,
    #[serde(default, deserialize_with = "truthy")]
    deleted: bool,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    version: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

fn to_delta_node(node: WireDeltaNode) -> RemoteDeltaNode {
    RemoteDeltaNode {
        id: node.id,
        path: node.path,
        // the root collection has no id
        parent: node.parent.filter(|p| !p.is_empty()),
        directory: node.directory,
        deleted: node.deleted,
        hash: node.hash.filter(|h| !h.is_empty()),
        version: node.version,
        size: node.size,
    }
}

fn to_delta_page(page: WireDeltaPage) -> RemoteDeltaPage {
    RemoteDeltaPage {
        cursor: page.cursor.and_then(|c| DeltaCursor::new(c).ok()),
        has_more: page.has_more,
        reset: page.reset,
        nodes: page.nodes.into_iter().map(to_delta_node).collect(),
    }
}

// ============================================================================
// Request
// ============================================================================

/// Fetches one page of the change stream
pub async fn node_delta(
    client: &ApiClient,
    request: &DeltaRequest,
    limit: u32,
) -> Result<RemoteDeltaPage, ApiError> {
    let mut query: Vec<(&str, String)> = DELTA_ATTRIBUTES
        .iter()
        .map(|a| ("attributes[]", (*a).to_string()))
        .collect();
    query.push(("limit", limit.to_string()));
    match request {
        DeltaRequest::Cursor(Some(cursor)) => query.push(("cursor", cursor.as_str().to_string())),
        DeltaRequest::Cursor(None) => {}
        DeltaRequest::Node(id) => query.push(("id", id.clone())),
    }

    let page: WireDeltaPage = client.json(client.get("/node/delta").query(&query)).await?;
    debug!(
        nodes = page.nodes.len(),
        has_more = page.has_more,
        reset = page.reset,
        "Fetched delta page"
    );

    Ok(to_delta_page(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_wire_page() {
        let json = r#"{
            "reset": false,
            "cursor": "c-2",
            "has_more": true,
            "nodes": [
                {"id": "n1", "path": "/docs", "parent": null, "directory": true, "deleted": false},
                {"id": "n2", "path": "/docs/a.txt", "parent": "n1", "directory": false,
                 "deleted": "2026-10-01T10:00:00+00:00", "hash": "abc", "version": 4, "size": 12}
            ]
        }"#;
        let page = to_delta_page(serde_json::from_str(json).unwrap());

        assert_eq!(page.cursor.unwrap().as_str(), "c-2");
        assert!(page.has_more);
        assert_eq!(page.nodes.len(), 2);
        assert_eq!(page.nodes[0].parent, None);
        assert!(!page.nodes[0].deleted);
        assert!(page.nodes[1].deleted);
        assert_eq!(page.nodes[1].version.as_deref(), Some("4"));
        assert_eq!(page.nodes[1].size, Some(12));
    }

    #[test]
    fn empty_cursor_is_none() {
        let page = to_delta_page(serde_json::from_str(r#"{"cursor": "", "nodes": []}"#).unwrap());
        assert!(page.cursor.is_none());
        assert!(!page.has_more);
    }
}
