//! Remote service HTTP client
//!
//! Wraps `reqwest::Client` with authentication, the client identification
//! headers and the `{"data": ...}` response envelope.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use driftsync_api::client::{ApiClient, Credentials};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = ApiClient::new(
//!     "https://cloud.example.com/api/v2",
//!     Credentials::Bearer("token".into()),
//! );
//! let response = client.send(client.get("/node/attributes").query(&[("p", "/")])).await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{bail, Result};
use driftsync_core::config::ApiConfig;
use driftsync_core::ports::ApiError;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{classify, invalid_response, transport};
use crate::wire::Envelope;

/// Name reported in the `X-Client` and `User-Agent` headers
const CLIENT_NAME: &str = "driftsync";

// ============================================================================
// Credentials
// ============================================================================

/// How requests authenticate
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Basic { username: String, password: String },
}

impl Credentials {
    /// Picks the bearer token when set, else username and password
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        if let Some(token) = config.access_token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(Self::Bearer(token.clone()));
        }
        match (&config.username, &config.password) {
            (Some(username), Some(password)) if !username.is_empty() => Ok(Self::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => bail!("no API credentials configured: set api.access_token or api.username/api.password"),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(***)"),
            Self::Basic { username, .. } => write!(f, "Basic({username}:***)"),
        }
    }
}

// ============================================================================
// ApiClient
// ============================================================================

/// Authenticated HTTP client for the remote service
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    /// Value of the `X-Client` header: `name|version|hostname`
    client_header: String,
}

impl ApiClient {
    /// Creates a client for the API rooted at `base_url`
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            client_header: format!("{CLIENT_NAME}|{}|{hostname}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Ok(Self::new(config.url.clone(), Credentials::from_config(config)?))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for `endpoint`
    ///
    /// `endpoint` is relative to the base URL (`/node/delta`).
    pub fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint);
        let builder = self
            .client
            .request(method, &url)
            .header("X-Client", &self.client_header)
            .header(
                reqwest::header::USER_AGENT,
                format!("{CLIENT_NAME}/{}", env!("CARGO_PKG_VERSION")),
            );

        match &self.credentials {
            Credentials::Bearer(token) => builder.bearer_auth(token),
            Credentials::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
        }
    }

    pub fn get(&self, endpoint: &str) -> RequestBuilder {
        self.request(Method::GET, endpoint)
    }

    pub fn post(&self, endpoint: &str) -> RequestBuilder {
        self.request(Method::POST, endpoint)
    }

    /// Sends a request, turning transport failures and non-2xx statuses into [`ApiError`]s
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(transport)?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify(status, &body);
        debug!(status = status.as_u16(), code = %err.code, "API request failed");
        Err(err)
    }

    /// Sends a request and decodes the `data` member of the response body
    pub async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(builder).await?;
        let body = response.text().await.map_err(transport)?;
        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(invalid_response)?;
        Ok(envelope.data)
    }
}
