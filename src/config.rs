//! Configuration: credentials, endpoints and per-call fetch options.

use std::env;
use std::time::Duration;

use crate::error::{FiniteStateError, Result};
use crate::fanout::{FailurePolicy, FanOutOptions};
use crate::retry::RetryPolicy;

pub(crate) const DEFAULT_API_URL: &str = "https://platform.finitestate.io/api/v1/graphql";
pub(crate) const DEFAULT_TOKEN_URL: &str = "https://platform.finitestate.io/api/v1/auth/token";
pub(crate) const DEFAULT_AUDIENCE: &str = "https://platform.finitestate.io/api/v1/graphql";
pub(crate) const DEFAULT_REST_URL: &str = "https://platform.finitestate.io/api/public/v0";

/// Client credentials issued by Finite State API management.
///
/// Immutable once loaded. The secret never appears in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
    organization_context: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("organization_context", &self.organization_context)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Create credentials from explicit values.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        organization_context: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            organization_context: organization_context.into(),
        }
    }

    /// Read `CLIENT_ID`, `CLIENT_SECRET` and `ORGANIZATION_CONTEXT`.
    ///
    /// # Errors
    ///
    /// Returns [`FiniteStateError::ConfigMissing`] naming every variable that
    /// is unset or empty.
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());

        let client_id = read("CLIENT_ID");
        let client_secret = read("CLIENT_SECRET");
        let organization_context = read("ORGANIZATION_CONTEXT");

        match (client_id, client_secret, organization_context) {
            (Some(id), Some(secret), Some(org)) => Ok(Self::new(id, secret, org)),
            (id, secret, org) => {
                let missing: Vec<&str> = [
                    ("CLIENT_ID", id.is_none()),
                    ("CLIENT_SECRET", secret.is_none()),
                    ("ORGANIZATION_CONTEXT", org.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(FiniteStateError::ConfigMissing(format!(
                    "missing environment variables: {}",
                    missing.join(", ")
                )))
            }
        }
    }

    /// The OAuth client identifier.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// The organization context sent with every API request.
    pub fn organization_context(&self) -> &str {
        &self.organization_context
    }

    /// Whether both halves of the client credential are present.
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Base URLs for the platform's endpoints.
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    /// GraphQL endpoint.
    pub graphql_url: String,
    /// OAuth token endpoint.
    pub token_url: String,
    /// Audience requested during token exchange.
    pub audience: String,
    /// Base URL for REST paths.
    pub rest_url: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            graphql_url: DEFAULT_API_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            rest_url: DEFAULT_REST_URL.to_string(),
        }
    }
}

impl ApiEndpoints {
    /// Defaults overridden by `FINITE_STATE_API_URL`, `FINITE_STATE_TOKEN_URL`,
    /// `FINITE_STATE_AUDIENCE` and `FINITE_STATE_REST_URL`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            graphql_url: env::var("FINITE_STATE_API_URL").unwrap_or(defaults.graphql_url),
            token_url: env::var("FINITE_STATE_TOKEN_URL").unwrap_or(defaults.token_url),
            audience: env::var("FINITE_STATE_AUDIENCE").unwrap_or(defaults.audience),
            rest_url: env::var("FINITE_STATE_REST_URL").unwrap_or(defaults.rest_url),
        }
    }

    /// Point every endpoint at one base URL, as the mock platform serves them.
    pub fn for_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            graphql_url: format!("{base}/api/v1/graphql"),
            token_url: format!("{base}/api/v1/auth/token"),
            audience: format!("{base}/api/v1/graphql"),
            rest_url: format!("{base}/api/public/v0"),
        }
    }
}

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Largest page the API accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// The options a report sets per invocation.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Records per page.
    pub page_size: u32,
    /// Stop after this many records.
    pub max_records: Option<usize>,
    /// Retry behaviour for every request.
    pub retry: RetryPolicy,
    /// Fan-out behaviour for per-parent fetches.
    pub fan_out: FanOutOptions,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_records: None,
            retry: RetryPolicy::default(),
            fan_out: FanOutOptions::default(),
        }
    }
}

impl FetchOptions {
    /// Options for reports that must not silently lose data.
    pub fn fail_fast() -> Self {
        let mut options = Self::default();
        options.fan_out.policy = FailurePolicy::FailFast;
        options
    }

    /// Options for trend reports where partial history is still useful.
    pub fn best_effort() -> Self {
        let mut options = Self::default();
        options.fan_out.policy = FailurePolicy::BestEffort;
        options
    }

    /// Set the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the fan-out concurrency limit.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.fan_out.concurrency = concurrency;
        self
    }

    /// Set a deadline for the whole fan-out.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.fan_out.deadline = Some(deadline);
        self
    }

    /// Check that the page size is within the API's bounds.
    ///
    /// # Errors
    ///
    /// Returns [`FiniteStateError::InvalidArgument`] when out of range.
    pub fn validate(&self) -> Result<()> {
        validate_page_size(self.page_size)?;
        if self.fan_out.concurrency == 0 {
            return Err(FiniteStateError::InvalidArgument(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(FiniteStateError::InvalidArgument(
                "max attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn validate_page_size(page_size: u32) -> Result<()> {
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(FiniteStateError::InvalidArgument(format!(
            "page size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_hides_secret() {
        let creds = Credentials::new("client", "s3cr3t", "org-1");
        let debug = format!("{creds:?}");
        assert!(debug.contains("client"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_endpoints_for_base_url() {
        let endpoints = ApiEndpoints::for_base_url("http://127.0.0.1:9000/");
        assert_eq!(endpoints.graphql_url, "http://127.0.0.1:9000/api/v1/graphql");
        assert_eq!(endpoints.token_url, "http://127.0.0.1:9000/api/v1/auth/token");
        assert_eq!(endpoints.rest_url, "http://127.0.0.1:9000/api/public/v0");
    }

    #[test]
    fn test_page_size_bounds() {
        assert!(FetchOptions::default().with_page_size(0).validate().is_err());
        assert!(FetchOptions::default().with_page_size(1001).validate().is_err());
        assert!(FetchOptions::default().with_page_size(1000).validate().is_ok());
    }

    #[test]
    fn test_policy_presets() {
        assert_eq!(FetchOptions::fail_fast().fan_out.policy, FailurePolicy::FailFast);
        assert_eq!(FetchOptions::best_effort().fan_out.policy, FailurePolicy::BestEffort);
    }
}
