//! Integration tests for node mutations and attribute lookups

use driftsync_core::ports::{ApiErrorCode, IRemoteService};
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_create_collection_returns_id() {
    let (server, service) = common::setup().await;

    Mock::given(method("POST"))
        .and(path("/collection"))
        .and(query_param("p", "/docs/new"))
        .and(header("authorization", "Bearer test-token"))
        .and(header_exists("x-client"))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::data(
            serde_json::json!("58760130a641e6ff1a8b45bf"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let id = service.create_collection("/docs/new").await.unwrap();
    assert_eq!(id, "58760130a641e6ff1a8b45bf");
}

#[tokio::test]
async fn test_rename_move_delete_endpoints() {
    let (server, service) = common::setup().await;

    Mock::given(method("POST"))
        .and(path("/node/name"))
        .and(query_param("id", "n1"))
        .and(query_param("name", "b.txt"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/node/move"))
        .and(query_param("id", "n1"))
        .and(query_param("destp", "/archive"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/node"))
        .and(query_param("id", "n1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    service.rename_node("n1", "b.txt").await.unwrap();
    service.move_node("n1", "/archive").await.unwrap();
    service.delete_node("n1").await.unwrap();
}

#[tokio::test]
async fn test_error_codes_are_classified() {
    let (server, service) = common::setup().await;

    Mock::given(method("POST"))
        .and(path("/node/name"))
        .respond_with(ResponseTemplate::new(400).set_body_json(common::error_body(25)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/node/move"))
        .respond_with(ResponseTemplate::new(400).set_body_json(common::error_body(54)))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/node"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/collection"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = service.rename_node("n1", "x").await.unwrap_err();
    assert_eq!(err.code, ApiErrorCode::NodeReadOnly);
    assert!(err.is_readonly());

    let err = service.move_node("n1", "/gone").await.unwrap_err();
    assert_eq!(err.code, ApiErrorCode::DestinationNotFound);

    let err = service.delete_node("n1").await.unwrap_err();
    assert!(err.is_unauthorized());

    let err = service.create_collection("/x").await.unwrap_err();
    assert_eq!(err.code, ApiErrorCode::NotFound);
}

#[tokio::test]
async fn test_get_attributes_by_path() {
    let (server, service) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/node/attributes"))
        .and(query_param("p", "/shared"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::data(serde_json::json!({
            "id": "s1",
            "name": "shared",
            "path": "/shared",
            "parent": null,
            "readonly": false,
            "share": "5a1bc",
            "access": "r"
        }))))
        .mount(&server)
        .await;

    let attrs = service.get_attributes("/shared").await.unwrap();
    assert_eq!(attrs.id, "s1");
    assert_eq!(attrs.parent, None);
    assert!(attrs.blocks_writes());
}

#[tokio::test]
async fn test_get_attributes_by_ids() {
    let (server, service) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/node/attributes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::data(serde_json::json!([
            { "id": "a", "path": "/a", "hash": "h1", "version": 3 },
            { "id": "b", "path": "/b", "readonly": true }
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    let attrs = service
        .get_attributes_by_ids(&["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(attrs.len(), 2);
    assert_eq!(attrs[0].version.as_deref(), Some("3"));
    assert!(attrs[1].readonly);

    // no ids, no request
    assert!(service.get_attributes_by_ids(&[]).await.unwrap().is_empty());
}
