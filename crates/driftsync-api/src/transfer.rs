//! Content transfers
//!
//! - [`put_chunk`] - Sends one chunk of an upload (`PUT /file/chunk`, or
//!   `PUT /file` when the whole file fits in one chunk)
//! - [`download_to`] - Streams a file version into a local file starting at
//!   an offset (`GET /node` with a `Range` header)
//!
//! Chunk indexes are one-based on the wire. Only the request carrying the
//! last chunk answers with the stored node.

use std::path::Path;

use driftsync_core::ports::{ApiError, ApiErrorCode, UploadChunk, UploadedFile};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, RANGE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::client::ApiClient;
use crate::error::invalid_response;
use crate::wire::opt_string;

// ============================================================================
// Upload
// ============================================================================

/// What the service answered for the final chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadReply {
    /// The full identity of the stored version
    Stored(UploadedFile),
    /// Only the node id; version and hash need a follow-up lookup
    IdOnly(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireUploadData {
    Node {
        id: String,
        #[serde(default, deserialize_with = "opt_string")]
        version: Option<String>,
        #[serde(default)]
        hash: Option<String>,
    },
    Id(String),
    Other(serde_json::Value),
}

/// Sends one chunk; returns the reply for the last chunk, `None` otherwise
pub async fn put_chunk(client: &ApiClient, chunk: UploadChunk) -> Result<Option<UploadReply>, ApiError> {
    let last = chunk.index + 1 >= chunk.total_chunks;

    let mut query: Vec<(&str, String)> = Vec::new();
    match &chunk.remote_id {
        Some(id) => query.push(("id", id.clone())),
        None => query.push(("p", chunk.path.clone())),
    }

    let endpoint = if chunk.total_chunks <= 1 {
        "/file"
    } else {
        query.push(("chunkgroup", chunk.chunk_group.clone()));
        query.push(("index", (chunk.index + 1).to_string()));
        query.push(("chunks", chunk.total_chunks.to_string()));
        query.push(("size", chunk.total_size.to_string()));
        "/file/chunk"
    };

    debug!(
        path = %chunk.path,
        index = chunk.index,
        total = chunk.total_chunks,
        bytes = chunk.data.len(),
        "Uploading chunk"
    );

    let builder = client
        .request(Method::PUT, endpoint)
        .query(&query)
        .header(CONTENT_TYPE, "application/octet-stream")
        .body(chunk.data);

    if !last {
        client.send(builder).await?;
        return Ok(None);
    }

    let data: WireUploadData = client.json(builder).await?;
    match data {
        WireUploadData::Node {
            id,
            version: Some(version),
            hash: Some(hash),
        } => Ok(Some(UploadReply::Stored(UploadedFile {
            remote_id: id,
            version,
            hash,
        }))),
        WireUploadData::Node { id, .. } | WireUploadData::Id(id) => Ok(Some(UploadReply::IdOnly(id))),
        WireUploadData::Other(value) => Err(invalid_response(format!(
            "unexpected upload reply: {value}"
        ))),
    }
}

// ============================================================================
// Download
// ============================================================================

fn aborted(err: impl std::fmt::Display) -> ApiError {
    ApiError::new(ApiErrorCode::DownloadAborted, err.to_string())
}

/// Streams `remote_id` into `dest`, appending from `offset` on
///
/// Returns the number of bytes written by this call. When the server ignores
/// the range and sends the whole file, `dest` is truncated first.
pub async fn download_to(
    client: &ApiClient,
    remote_id: &str,
    version: Option<&str>,
    offset: u64,
    dest: &Path,
) -> Result<u64, ApiError> {
    let mut query: Vec<(&str, String)> = vec![
        ("id", remote_id.to_string()),
        ("download", "true".to_string()),
    ];
    if let Some(version) = version {
        query.push(("version", version.to_string()));
    }

    let mut builder = client.get("/node").query(&query);
    if offset > 0 {
        builder = builder.header(RANGE, format!("bytes={offset}-"));
    }

    let response = client.send(builder).await?;
    let restart = offset > 0 && response.status() != StatusCode::PARTIAL_CONTENT;
    if restart {
        info!(remote_id, offset, "Server ignored range, restarting download");
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(!restart)
        .truncate(restart)
        .open(dest)
        .await
        .map_err(aborted)?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(bytes) = stream.next().await {
        let bytes = bytes.map_err(aborted)?;
        file.write_all(&bytes).await.map_err(aborted)?;
        written += bytes.len() as u64;
    }
    file.flush().await.map_err(aborted)?;

    debug!(remote_id, written, "Download finished");
    Ok(written)
}
