//! HTTP implementation of the remote service port
//!
//! [`HttpRemoteService`] implements [`IRemoteService`] on top of
//! [`ApiClient`], the delta module and the transfer module.
//!
//! ## Design Notes
//!
//! - Nodes are addressed by remote id for mutations and by root-relative path
//!   for creation and attribute lookups.
//! - An upload whose final reply carries only the node id is completed with
//!   an attribute lookup, so callers always receive version and hash.
//! - Attribute lookups by id silently skip ids the server does not know.

use std::path::Path;

use async_trait::async_trait;
use driftsync_core::config::ApiConfig;
use driftsync_core::ports::{
    ApiError, ApiErrorCode, DeltaRequest, IRemoteService, RemoteAttributes, RemoteDeltaPage,
    UploadChunk, UploadedFile,
};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::client::ApiClient;
use crate::delta;
use crate::transfer::{self, UploadReply};
use crate::wire::{opt_string, truthy};

/// Attributes requested from `/node/attributes`
const ATTRIBUTES: [&str; 10] = [
    "id", "name", "path", "parent", "hash", "version", "size", "readonly", "share", "access",
];

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireAttributes {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    parent: Option<String>,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    version: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    readonly: bool,
    /// `false` or the id of the share
    #[serde(default, deserialize_with = "truthy")]
    share: bool,
    #[serde(default)]
    access: Option<String>,
}

fn to_attributes(wire: WireAttributes) -> RemoteAttributes {
    RemoteAttributes {
        id: wire.id,
        name: wire.name,
        path: wire.path,
        parent: wire.parent.filter(|p| !p.is_empty()),
        hash: wire.hash.filter(|h| !h.is_empty()),
        version: wire.version,
        size: wire.size,
        readonly: wire.readonly,
        share: wire.share,
        access: wire.access,
    }
}

fn attribute_query() -> Vec<(&'static str, String)> {
    ATTRIBUTES
        .iter()
        .map(|a| ("attributes[]", (*a).to_string()))
        .collect()
}

// ============================================================================
// HttpRemoteService
// ============================================================================

/// Remote service reached over its REST API
#[derive(Debug, Clone)]
pub struct HttpRemoteService {
    client: ApiClient,
    delta_page_size: u32,
}

impl HttpRemoteService {
    pub fn new(client: ApiClient, delta_page_size: u32) -> Self {
        Self {
            client,
            delta_page_size: delta_page_size.max(1),
        }
    }

    pub fn from_config(config: &ApiConfig) -> anyhow::Result<Self> {
        Ok(Self::new(ApiClient::from_config(config)?, config.delta_page_size))
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait]
impl IRemoteService for HttpRemoteService {
    #[instrument(skip(self))]
    async fn create_collection(&self, path: &str) -> Result<String, ApiError> {
        let id: String = self
            .client
            .json(self.client.post("/collection").query(&[("p", path)]))
            .await?;
        debug!(path, remote_id = %id, "Created collection");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn rename_node(&self, remote_id: &str, name: &str) -> Result<(), ApiError> {
        self.client
            .send(
                self.client
                    .post("/node/name")
                    .query(&[("id", remote_id), ("name", name)]),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn move_node(&self, remote_id: &str, destination: &str) -> Result<(), ApiError> {
        self.client
            .send(
                self.client
                    .post("/node/move")
                    .query(&[("id", remote_id), ("destp", destination)]),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_node(&self, remote_id: &str) -> Result<(), ApiError> {
        self.client
            .send(
                self.client
                    .request(Method::DELETE, "/node")
                    .query(&[("id", remote_id)]),
            )
            .await?;
        Ok(())
    }

    async fn upload_chunk(&self, chunk: UploadChunk) -> Result<Option<UploadedFile>, ApiError> {
        let path = chunk.path.clone();
        match transfer::put_chunk(&self.client, chunk).await? {
            None => Ok(None),
            Some(UploadReply::Stored(file)) => Ok(Some(file)),
            Some(UploadReply::IdOnly(id)) => {
                let attrs = self.get_attributes(&path).await?;
                match (attrs.version, attrs.hash) {
                    (Some(version), Some(hash)) => Ok(Some(UploadedFile {
                        remote_id: id,
                        version,
                        hash,
                    })),
                    _ => Err(ApiError::new(
                        ApiErrorCode::Unknown,
                        format!("uploaded node {id} has no version or hash"),
                    )),
                }
            }
        }
    }

    async fn download_file(
        &self,
        remote_id: &str,
        version: Option<&str>,
        offset: u64,
        dest: &Path,
    ) -> Result<u64, ApiError> {
        transfer::download_to(&self.client, remote_id, version, offset, dest).await
    }

    async fn get_attributes(&self, path: &str) -> Result<RemoteAttributes, ApiError> {
        let mut query = attribute_query();
        query.push(("p", path.to_string()));
        let wire: WireAttributes = self
            .client
            .json(self.client.get("/node/attributes").query(&query))
            .await?;
        Ok(to_attributes(wire))
    }

    async fn get_attributes_by_ids(&self, ids: &[String]) -> Result<Vec<RemoteAttributes>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = attribute_query();
        query.extend(ids.iter().map(|id| ("id[]", id.clone())));
        let wire: Vec<WireAttributes> = self
            .client
            .json(self.client.get("/node/attributes").query(&query))
            .await?;
        Ok(wire.into_iter().map(to_attributes).collect())
    }

    async fn node_delta(&self, request: &DeltaRequest) -> Result<RemoteDeltaPage, ApiError> {
        delta::node_delta(&self.client, request, self.delta_page_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_flag_accepts_ids() {
        let wire: WireAttributes = serde_json::from_str(
            r#"{"id": "s1", "share": "5a1b", "access": "r", "readonly": false, "version": 1}"#,
        )
        .unwrap();
        let attrs = to_attributes(wire);
        assert!(attrs.share);
        assert!(attrs.blocks_writes());
        assert_eq!(attrs.version.as_deref(), Some("1"));
    }

    #[test]
    fn root_parent_is_none() {
        let wire: WireAttributes = serde_json::from_str(r#"{"id": "n", "parent": ""}"#).unwrap();
        assert_eq!(to_attributes(wire).parent, None);
    }
}
