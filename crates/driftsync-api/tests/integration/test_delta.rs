//! Integration tests for delta page requests

use driftsync_core::domain::DeltaCursor;
use driftsync_core::ports::{DeltaRequest, IRemoteService};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_delta_without_cursor_lists_everything() {
    let (server, service) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/node/delta"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::data(serde_json::json!({
            "reset": true,
            "cursor": "c-1",
            "has_more": true,
            "nodes": [
                { "id": "d1", "path": "/docs", "parent": null, "directory": true, "deleted": false },
                { "id": "f1", "path": "/docs/a.txt", "parent": "d1", "directory": false,
                  "deleted": false, "hash": "h", "version": 1, "size": 3 }
            ]
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let page = service.node_delta(&DeltaRequest::Cursor(None)).await.unwrap();
    assert!(page.reset);
    assert!(page.has_more);
    assert_eq!(page.cursor.unwrap().as_str(), "c-1");
    assert_eq!(page.nodes.len(), 2);
    assert!(page.nodes[0].directory);
    assert_eq!(page.nodes[1].parent.as_deref(), Some("d1"));
}

#[tokio::test]
async fn test_delta_with_cursor() {
    let (server, service) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/node/delta"))
        .and(query_param("cursor", "c-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::data(serde_json::json!({
            "reset": false,
            "cursor": "c-8",
            "has_more": false,
            "nodes": [
                { "id": "f1", "path": "/a.txt", "directory": false,
                  "deleted": "2026-10-02T08:00:00+00:00" }
            ]
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let cursor = DeltaCursor::new("c-7".into()).unwrap();
    let page = service
        .node_delta(&DeltaRequest::Cursor(Some(cursor)))
        .await
        .unwrap();
    assert!(!page.has_more);
    assert!(page.nodes[0].deleted);
}

#[tokio::test]
async fn test_delta_for_one_collection() {
    let (server, service) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/node/delta"))
        .and(query_param("id", "d9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::data(serde_json::json!({
            "cursor": "x",
            "has_more": false,
            "nodes": []
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let page = service
        .node_delta(&DeltaRequest::Node("d9".into()))
        .await
        .unwrap();
    assert!(page.nodes.is_empty());
}
