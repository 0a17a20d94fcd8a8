//! Integration tests for chunked uploads and ranged downloads

use driftsync_core::ports::{ApiErrorCode, IRemoteService, UploadChunk};
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn chunk(index: u64, total: u64, data: &[u8]) -> UploadChunk {
    UploadChunk {
        path: "/docs/a.txt".into(),
        remote_id: None,
        chunk_group: "58a5fae2-431a-4fbb-83f3-5c4f4fb9773c".into(),
        index,
        total_chunks: total,
        total_size: 6,
        data: data.to_vec(),
    }
}

#[tokio::test]
async fn test_single_chunk_uses_file_endpoint() {
    let (server, service) = common::setup().await;

    Mock::given(method("PUT"))
        .and(path("/file"))
        .and(query_param("p", "/docs/a.txt"))
        .and(header("content-type", "application/octet-stream"))
        .and(body_bytes(b"abcdef".to_vec()))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::data(serde_json::json!({
            "id": "n1", "version": 1, "hash": "e80b5017098950fc58aad83c8c14978e"
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let stored = service
        .upload_chunk(chunk(0, 1, b"abcdef"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.remote_id, "n1");
    assert_eq!(stored.version, "1");
}

#[tokio::test]
async fn test_chunked_upload_completes_with_attribute_lookup() {
    let (server, service) = common::setup().await;

    Mock::given(method("PUT"))
        .and(path("/file/chunk"))
        .and(query_param("index", "1"))
        .and(query_param("chunks", "2"))
        .and(query_param("chunkgroup", "58a5fae2-431a-4fbb-83f3-5c4f4fb9773c"))
        .respond_with(ResponseTemplate::new(206).set_body_json(common::data(serde_json::json!(1))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/file/chunk"))
        .and(query_param("index", "2"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(common::data(serde_json::json!("n1"))),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/node/attributes"))
        .and(query_param("p", "/docs/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::data(serde_json::json!({
            "id": "n1", "version": "2", "hash": "h2"
        }))))
        .expect(1)
        .mount(&server)
        .await;

    assert!(service.upload_chunk(chunk(0, 2, b"abc")).await.unwrap().is_none());
    let stored = service.upload_chunk(chunk(1, 2, b"def")).await.unwrap().unwrap();
    assert_eq!(stored.remote_id, "n1");
    assert_eq!(stored.version, "2");
    assert_eq!(stored.hash, "h2");
}

#[tokio::test]
async fn test_upload_into_readonly_share() {
    let (server, service) = common::setup().await;

    Mock::given(method("PUT"))
        .and(path("/file"))
        .respond_with(ResponseTemplate::new(403).set_body_json(common::error_body(38)))
        .mount(&server)
        .await;

    let err = service.upload_chunk(chunk(0, 1, b"abcdef")).await.unwrap_err();
    assert_eq!(err.code, ApiErrorCode::ReadOnlyShare);
}

#[tokio::test]
async fn test_download_writes_file() {
    let (server, service) = common::setup().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("dl.tmp");

    Mock::given(method("GET"))
        .and(path("/node"))
        .and(query_param("id", "n1"))
        .and(query_param("version", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let written = service.download_file("n1", Some("3"), 0, &dest).await.unwrap();
    assert_eq!(written, 11);
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hello world");
}

#[tokio::test]
async fn test_download_resumes_with_range() {
    let (server, service) = common::setup().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("dl.tmp");
    tokio::fs::write(&dest, b"hello").await.unwrap();

    Mock::given(method("GET"))
        .and(path("/node"))
        .and(header("range", "bytes=5-"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(b" world".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let written = service.download_file("n1", None, 5, &dest).await.unwrap();
    assert_eq!(written, 6);
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hello world");
}

#[tokio::test]
async fn test_download_restarts_when_range_ignored() {
    let (server, service) = common::setup().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("dl.tmp");
    tokio::fs::write(&dest, b"stale").await.unwrap();

    Mock::given(method("GET"))
        .and(path("/node"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh content".to_vec()))
        .mount(&server)
        .await;

    service.download_file("n1", None, 5, &dest).await.unwrap();
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"fresh content");
}
