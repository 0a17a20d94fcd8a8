//! driftsync Core - Domain model and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Node` records with their pending `LocalActions` / `RemoteActions`,
//!   queue `Task`s, `QueueError`s, ignored subtrees and transfer bookkeeping
//! - **Path rules** - posix path helpers, exclude patterns and invalid-name detection
//! - **Port definitions** - Traits for adapters: `INodeStore`, `IIgnoreStore`,
//!   `IQueueErrorStore`, `ITransferStore`, `IRemoteService`, `ILocalFileSystem`
//! - **Configuration** - YAML-backed `Config` with validation
//!
//! # Architecture
//!
//! The domain module contains pure data and rules with no I/O.
//! Ports define the trait interfaces that the cache, api and sync crates
//! implement or consume.

pub mod config;
pub mod domain;
pub mod ports;
