//! Integration tests for driftsync-api
//!
//! Uses wiremock to simulate the remote REST API and verifies the
//! request shapes, error classification, delta paging and transfers of
//! `HttpRemoteService`.

mod common;

mod test_delta;
mod test_nodes;
mod test_transfer;
