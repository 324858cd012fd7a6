//! Mock Finite State platform server.
//!
//! Provides an axum-based HTTP server that serves the token endpoint, the
//! GraphQL endpoint and the public REST projects API from one base URL.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::fixtures::Fixtures;
use super::handlers;
use super::state::MockState;
use crate::config::{ApiEndpoints, Credentials};
use crate::error::Result;
use crate::FiniteStateClient;

/// Client id accepted by [`MockServer::client`].
pub const MOCK_CLIENT_ID: &str = "mock-client";

/// Client secret accepted by [`MockServer::client`].
pub const MOCK_CLIENT_SECRET: &str = "mock-secret";

/// Organization context sent by [`MockServer::client`].
pub const MOCK_ORGANIZATION: &str = "mock-org";

/// A mock Finite State platform for testing.
///
/// The server runs in the background on a random local port. Its state can
/// be inspected and modified while a test runs.
pub struct MockServer {
    /// The URL where the server is listening.
    url: String,
    /// Handle to the server task.
    handle: JoinHandle<()>,
    /// Shared state that can be modified during tests.
    state: Arc<RwLock<MockState>>,
}

impl MockServer {
    /// Start a new mock server with the default scenario.
    pub async fn start() -> Self {
        Self::with_state(Fixtures::default_scenario()).await
    }

    /// Start a mock server with empty state.
    pub async fn start_empty() -> Self {
        Self::with_state(MockState::new()).await
    }

    /// Start a mock server with custom state.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn with_state(state: MockState) -> Self {
        let shared_state = state.shared();
        let app = Self::create_router(shared_state.clone());

        // Bind to a random available port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let addr = listener.local_addr().expect("Failed to get local address");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "mock server stopped");
            }
        });

        Self {
            url: format!("http://{}", addr),
            handle,
            state: shared_state,
        }
    }

    /// Get the base URL of the mock server.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Endpoints pointing at this server.
    pub fn endpoints(&self) -> ApiEndpoints {
        ApiEndpoints::for_base_url(&self.url)
    }

    /// A client configured against this server.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built.
    pub fn client(&self) -> Result<FiniteStateClient> {
        FiniteStateClient::new(
            Credentials::new(MOCK_CLIENT_ID, MOCK_CLIENT_SECRET, MOCK_ORGANIZATION),
            &self.endpoints(),
        )
    }

    /// A client against this server that caches its token under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built.
    pub fn cached_client(&self, dir: impl Into<std::path::PathBuf>) -> Result<FiniteStateClient> {
        FiniteStateClient::new_cached(
            Credentials::new(MOCK_CLIENT_ID, MOCK_CLIENT_SECRET, MOCK_ORGANIZATION),
            &self.endpoints(),
            dir,
        )
    }

    /// Get access to the server's shared state.
    pub fn state(&self) -> Arc<RwLock<MockState>> {
        self.state.clone()
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }

    /// Create the axum router with all routes.
    fn create_router(state: Arc<RwLock<MockState>>) -> Router {
        Router::new()
            .route("/api/v1/auth/token", post(handlers::issue_token))
            .route("/api/v1/graphql", post(handlers::graphql))
            .route("/api/public/v0/projects", get(handlers::list_projects))
            .route("/api/public/v0/projects/:id", get(handlers::get_project))
            // Health check
            .route("/health", get(health_check))
            .with_state(state)
    }
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "ok"
}
