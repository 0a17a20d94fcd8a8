//! driftsync API - HTTP adapter for the remote storage service
//!
//! Provides an async client for:
//! - Collection and node mutations (create, rename, move, delete)
//! - Chunked uploads and ranged, resumable downloads
//! - Attribute lookups by path or by id
//! - The paginated node delta stream
//!
//! ## Modules
//!
//! - [`client`] - Authenticated HTTP client and response envelope handling
//! - [`error`] - Classification of failed responses into [`ApiErrorCode`]s
//! - [`delta`] - Delta page requests and wire types
//! - [`transfer`] - Chunk uploads and ranged downloads
//! - [`provider`] - [`IRemoteService`] implementation over the modules above
//!
//! [`ApiErrorCode`]: driftsync_core::ports::ApiErrorCode
//! [`IRemoteService`]: driftsync_core::ports::IRemoteService

pub mod client;
pub mod delta;
pub mod error;
pub mod provider;
pub mod transfer;
mod wire;

pub use client::{ApiClient, Credentials};
pub use provider::HttpRemoteService;
