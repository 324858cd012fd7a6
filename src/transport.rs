//! Single-shot HTTP transport.
//!
//! A [`Transport`] performs exactly one network call for a
//! [`RequestDescriptor`] and classifies the outcome into the closed set of
//! [`TransportError`] variants. Retrying is the caller's job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::auth::SessionToken;
use crate::error::{FiniteStateError, Result};

const USER_AGENT: &str = concat!("finite-state-sdk/", env!("CARGO_PKG_VERSION"));

/// GraphQL error codes the platform uses to signal throttling.
const RATE_LIMIT_CODES: &[&str] = &["RATE_LIMITED", "TOO_MANY_REQUESTS", "THROTTLED"];

/// GraphQL error codes the platform uses for rejected credentials.
const AUTH_CODES: &[&str] = &["UNAUTHENTICATED", "UNAUTHORIZED"];

/// What to send: a GraphQL document or a REST GET.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestDescriptor {
    /// A GraphQL POST.
    GraphQl {
        /// The query or mutation document.
        query: String,
        /// Variables for the document.
        variables: Value,
    },
    /// A REST GET relative to the REST base URL.
    Rest {
        /// Path, e.g. `projects`.
        path: String,
        /// Query string parameters.
        params: Vec<(String, String)>,
    },
}

impl RequestDescriptor {
    /// Build a GraphQL request.
    pub fn graphql(query: impl Into<String>, variables: Value) -> Self {
        Self::GraphQl {
            query: query.into(),
            variables,
        }
    }

    /// Build a REST GET request.
    pub fn rest(path: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self::Rest {
            path: path.into(),
            params,
        }
    }
}

/// Classified failure of one transport call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// HTTP 429 or a GraphQL throttling error.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// HTTP 5xx.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// HTTP 4xx other than 401/429, or GraphQL `errors` on a 200.
    #[error("client error {status}: {message}")]
    Client { status: u16, message: String },

    /// Connection, timeout or body read failure.
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 401 or a GraphQL authentication error.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl TransportError {
    /// Whether the retry policy may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server { .. } | Self::Network(_)
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Executes one request with a given token.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform exactly one call and return the decoded JSON payload.
    async fn execute(
        &self,
        request: &RequestDescriptor,
        token: &SessionToken,
    ) -> core::result::Result<Value, TransportError>;
}

/// reqwest-backed transport for the GraphQL and REST endpoints.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    graphql_url: Url,
    rest_url: Url,
    organization_context: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("graphql_url", &self.graphql_url.as_str())
            .field("rest_url", &self.rest_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Create a transport for the given endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if either URL is invalid or the HTTP client cannot be
    /// built.
    pub fn new(graphql_url: &str, rest_url: &str, organization_context: &str) -> Result<Self> {
        // Ensure REST base URL ends with / so joins keep the last segment
        let rest_url_str = if rest_url.ends_with('/') {
            rest_url.to_string()
        } else {
            format!("{rest_url}/")
        };

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(FiniteStateError::HttpError)?;

        Ok(Self {
            http,
            graphql_url: Url::parse(graphql_url)?,
            rest_url: Url::parse(&rest_url_str)?,
            organization_context: organization_context.to_string(),
        })
    }

    /// The GraphQL endpoint.
    pub fn graphql_url(&self) -> &Url {
        &self.graphql_url
    }

    /// The REST base URL.
    pub fn rest_url(&self) -> &Url {
        &self.rest_url
    }

    /// Convert a non-success response into a classified error.
    async fn check_response(response: Response) -> core::result::Result<Response, TransportError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(TransportError::RateLimited { retry_after });
        }

        let message = Self::extract_error_message(response, status).await;
        let status = status.as_u16();
        Err(match status {
            401 => TransportError::Unauthorized(message),
            500..=599 => TransportError::Server { status, message },
            _ => TransportError::Client { status, message },
        })
    }

    /// Extract error message from a failed response.
    async fn extract_error_message(response: Response, status: StatusCode) -> String {
        let body = match response.text().await {
            Ok(b) => b,
            Err(_) => return format!("HTTP {status}"),
        };

        if let Ok(json) = serde_json::from_str::<Value>(&body) {
            if let Some(msg) = json.get("message").and_then(|m| m.as_str()) {
                return msg.to_string();
            }
            if let Some(err) = json.get("error").and_then(|m| m.as_str()) {
                return err.to_string();
            }
        }

        if body.is_empty() {
            format!("HTTP {status}")
        } else {
            body
        }
    }

    async fn decode(response: Response) -> core::result::Result<Value, TransportError> {
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Client {
            status,
            message: format!("response is not valid JSON: {e}"),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(skip(self, request, token), fields(kind))]
    async fn execute(
        &self,
        request: &RequestDescriptor,
        token: &SessionToken,
    ) -> core::result::Result<Value, TransportError> {
        let builder = match request {
            RequestDescriptor::GraphQl { query, variables } => {
                tracing::Span::current().record("kind", "graphql");
                self.http
                    .post(self.graphql_url.clone())
                    .json(&serde_json::json!({ "query": query, "variables": variables }))
            }
            RequestDescriptor::Rest { path, params } => {
                tracing::Span::current().record("kind", "rest");
                let url = self
                    .rest_url
                    .join(path.trim_start_matches('/'))
                    .map_err(|e| TransportError::Client {
                        status: 0,
                        message: format!("invalid REST path '{path}': {e}"),
                    })?;
                // The public REST API reads the raw token from X-Authorization.
                self.http
                    .get(url)
                    .query(params)
                    .header("X-Authorization", token.secret())
            }
        };

        let response = builder
            .bearer_auth(token.secret())
            .header("Organization-Context", &self.organization_context)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let payload = Self::decode(response).await?;

        match request {
            RequestDescriptor::GraphQl { .. } => check_graphql_errors(payload),
            RequestDescriptor::Rest { .. } => Ok(payload),
        }
    }
}

/// Reject GraphQL payloads that carry a non-empty `errors` array.
pub(crate) fn check_graphql_errors(payload: Value) -> core::result::Result<Value, TransportError> {
    let errors = match payload.get("errors").and_then(Value::as_array) {
        Some(errors) if !errors.is_empty() => errors,
        _ => return Ok(payload),
    };

    let code_matches = |codes: &[&str]| {
        errors.iter().any(|e| {
            e.pointer("/extensions/code")
                .and_then(Value::as_str)
                .is_some_and(|c| codes.iter().any(|k| k.eq_ignore_ascii_case(c)))
        })
    };

    let message = errors
        .iter()
        .map(|e| {
            e.get("message")
                .and_then(Value::as_str)
                .map_or_else(|| e.to_string(), str::to_string)
        })
        .collect::<Vec<_>>()
        .join("; ");

    if code_matches(RATE_LIMIT_CODES) {
        let retry_after = errors
            .iter()
            .find_map(|e| e.pointer("/extensions/retryAfter").and_then(Value::as_u64))
            .map(Duration::from_secs);
        return Err(TransportError::RateLimited { retry_after });
    }
    if code_matches(AUTH_CODES) {
        return Err(TransportError::Unauthorized(message));
    }
    Err(TransportError::Client {
        status: 200,
        message,
    })
}
