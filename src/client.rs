//! Finite State API client.
//!
//! Ties the [`AuthProvider`], a [`Transport`] and the retry policy together.
//! Higher-level operations are implemented via traits on entity types and
//! through [`FiniteStateClient::paginate`].

use std::sync::Arc;

use serde_json::Value;

use crate::auth::{AuthProvider, SessionToken};
use crate::config::{ApiEndpoints, Credentials, FetchOptions};
use crate::error::{FiniteStateError, Result};
use crate::pagination::{ListEndpoint, Paginator};
use crate::retry::{call_with_retry, RetryPolicy};
use crate::transport::{HttpTransport, RequestDescriptor, Transport};

/// Finite State API client.
///
/// Cheaply cloneable; clones share the token cache and connection pool.
///
/// # Example
///
/// ```no_run
/// use finite_state_sdk::FiniteStateClient;
///
/// # async fn example() -> finite_state_sdk::Result<()> {
/// // Reads CLIENT_ID, CLIENT_SECRET and ORGANIZATION_CONTEXT
/// let client = FiniteStateClient::from_env()?;
/// let token = client.get_token().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FiniteStateClient {
    auth: Arc<AuthProvider>,
    transport: Arc<dyn Transport>,
    options: FetchOptions,
}

impl std::fmt::Debug for FiniteStateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiniteStateClient")
            .field("auth", &self.auth)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl FiniteStateClient {
    /// Create a client from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required credential variable is unset.
    pub fn from_env() -> Result<Self> {
        let credentials = Credentials::from_env()?;
        Self::new(credentials, &ApiEndpoints::from_env())
    }

    /// Create a client for the given credentials and endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint URL is invalid.
    pub fn new(credentials: Credentials, endpoints: &ApiEndpoints) -> Result<Self> {
        let transport = HttpTransport::new(
            &endpoints.graphql_url,
            &endpoints.rest_url,
            credentials.organization_context(),
        )?;
        let auth = AuthProvider::http(credentials, endpoints)?;
        Ok(Self::with_transport(Arc::new(auth), Arc::new(transport)))
    }

    /// Create a client whose session token is cached on disk under `dir`
    /// and reused by later runs.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint URL is invalid.
    pub fn new_cached(
        credentials: Credentials,
        endpoints: &ApiEndpoints,
        dir: impl Into<std::path::PathBuf>,
    ) -> Result<Self> {
        let transport = HttpTransport::new(
            &endpoints.graphql_url,
            &endpoints.rest_url,
            credentials.organization_context(),
        )?;
        let auth = AuthProvider::http_cached(credentials, endpoints, dir)?;
        Ok(Self::with_transport(Arc::new(auth), Arc::new(transport)))
    }

    /// Create a client from explicit parts.
    pub fn with_transport(auth: Arc<AuthProvider>, transport: Arc<dyn Transport>) -> Self {
        Self {
            auth,
            transport,
            options: FetchOptions::default(),
        }
    }

    /// Replace the default fetch options.
    #[must_use]
    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    /// Default fetch options for this client.
    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// The shared auth provider.
    pub fn auth(&self) -> &Arc<AuthProvider> {
        &self.auth
    }

    /// Return the current session token.
    ///
    /// # Errors
    ///
    /// Returns [`FiniteStateError::Auth`] if the exchange fails.
    pub async fn get_token(&self) -> Result<SessionToken> {
        self.auth.get_token().await
    }

    /// Send a request under the client's default retry policy.
    ///
    /// # Errors
    ///
    /// See [`call_with_retry`].
    pub async fn send(&self, request: &RequestDescriptor) -> Result<Value> {
        self.send_with(request, &self.options.retry).await
    }

    /// Send a request under an explicit retry policy.
    ///
    /// # Errors
    ///
    /// See [`call_with_retry`].
    pub async fn send_with(&self, request: &RequestDescriptor, policy: &RetryPolicy) -> Result<Value> {
        let transport = self.transport.clone();
        call_with_retry(policy, &self.auth, |token| {
            let transport = transport.clone();
            async move { transport.execute(request, &token).await }
        })
        .await
    }

    /// Run a GraphQL document and return its `data` object.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response has no `data`.
    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let response = self
            .send(&RequestDescriptor::graphql(query, variables))
            .await?;
        match response {
            Value::Object(mut map) => map.remove("data").ok_or_else(|| {
                FiniteStateError::UnexpectedShape("GraphQL response has no data".to_string())
            }),
            _ => Err(FiniteStateError::UnexpectedShape(
                "GraphQL response is not an object".to_string(),
            )),
        }
    }

    /// Start a paginator over `endpoint` using the client's default options.
    pub fn paginate(&self, endpoint: ListEndpoint) -> Paginator {
        Paginator::new(self.clone(), endpoint, &self.options)
    }

    /// Start a paginator with explicit options.
    pub fn paginate_with(&self, endpoint: ListEndpoint, options: &FetchOptions) -> Paginator {
        Paginator::new(self.clone(), endpoint, options)
    }
}
