//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. The sync engine depends on them; the cache,
//! api and sync crates provide the implementations.
//!
//! ## Ports Overview
//!
//! - [`INodeStore`] - Node records, path/ino/remote-id lookups, subtree walk
//! - [`IIgnoreStore`], [`IQueueErrorStore`], [`ITransferStore`] - Bookkeeping collections
//! - [`IRemoteService`] - Remote storage operations with typed error codes
//! - [`ILocalFileSystem`] - Local filesystem access below the sync root

pub mod bookkeeping;
pub mod local_filesystem;
pub mod node_store;
pub mod remote_service;

pub use bookkeeping::{IIgnoreStore, IQueueErrorStore, ITransferStore};
pub use local_filesystem::ILocalFileSystem;
pub use node_store::{INodeStore, NodeVisitor, WalkOptions};
pub use remote_service::{
    ApiError, ApiErrorCode, DeltaRequest, IRemoteService, RemoteAttributes, RemoteDeltaNode,
    RemoteDeltaPage, UploadChunk, UploadedFile,
};
