//! Shared test helpers for the API integration tests

use driftsync_api::{ApiClient, Credentials, HttpRemoteService};
use wiremock::MockServer;

/// Starts a mock server and a service pointing at it
pub async fn setup() -> (MockServer, HttpRemoteService) {
    let server = MockServer::start().await;
    let client = ApiClient::new(server.uri(), Credentials::Bearer("test-token".into()));
    let service = HttpRemoteService::new(client, 2);
    (server, service)
}

/// Wraps a payload in the response envelope
pub fn data(value: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "status": 200, "data": value })
}

/// A coded error body
pub fn error_body(code: i64) -> serde_json::Value {
    serde_json::json!({
        "status": 400,
        "data": { "error": "Balloon\\Exception", "message": "rejected", "code": code }
    })
}
