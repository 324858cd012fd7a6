//! Mock Finite State platform for E2E testing.
//!
//! This module provides an in-memory server that simulates the token
//! endpoint, the GraphQL API and the public REST API. Unlike wiremock, which
//! mocks at the HTTP level per test, this server keeps state across requests
//! and can inject rate limiting, server errors and token revocation.
//!
//! # Example
//!
//! ```ignore
//! use finite_state_sdk::mock_server::MockServer;
//! use finite_state_sdk::{get_findings_count, FindingListQuery};
//!
//! #[tokio::test]
//! async fn test_workflow() {
//!     let server = MockServer::start().await;
//!     let client = server.client().unwrap();
//!
//!     let query = FindingListQuery::for_asset_version("av-1");
//!     assert_eq!(get_findings_count(&client, &query).await.unwrap(), 7);
//!
//!     server.shutdown().await;
//! }
//! ```

mod fixtures;
mod handlers;
mod server;
mod state;

pub use fixtures::Fixtures;
pub use server::{MockServer, MOCK_CLIENT_ID, MOCK_CLIENT_SECRET, MOCK_ORGANIZATION};
pub use state::{Fault, MockState};
