//! Error types for Finite State API operations.

use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can occur during Finite State API operations.
#[derive(Debug, Error)]
pub enum FiniteStateError {
    /// Configuration is missing or incomplete.
    #[error("Finite State configuration required: {0}")]
    ConfigMissing(String),

    /// A caller-supplied argument is out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Token exchange failed or a re-issued token was still rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The request was rejected by the API and will not succeed on retry.
    #[error("Finite State API error{}: {message}", status_label(.status_code))]
    Client {
        message: String,
        status_code: Option<u16>,
    },

    /// Retry budget exhausted on a transient failure.
    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: TransportError,
    },

    /// The per-operation hard timeout elapsed.
    #[error("Operation timed out after {attempts} attempts ({elapsed:?})")]
    Timeout { attempts: u32, elapsed: Duration },

    /// Pagination stopped part way; the records fetched so far were dropped.
    #[error("Pagination interrupted after {fetched} records: {source}")]
    Interrupted {
        fetched: usize,
        #[source]
        source: Box<FiniteStateError>,
    },

    /// Best-effort fan-out finished with some tasks missing.
    #[error("Partial result: {} task(s) failed: {}", .failed.len(), .failed.join(", "))]
    PartialResult { failed: Vec<String> },

    /// A fan-out worker panicked.
    #[error("Fetch task panicked: {0}")]
    TaskPanicked(String),

    /// A listing still had pages left when the page ceiling was reached.
    #[error("Stopped after {pages} pages with more results pending")]
    PageLimit { pages: u32 },

    /// The server handed back a cursor that was already consumed.
    #[error("Cursor '{0}' was returned twice")]
    CursorReused(String),

    /// The response did not have the expected shape.
    #[error("Unexpected response shape: {0}")]
    UnexpectedShape(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("Failed to parse response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),
}

fn status_label(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl FiniteStateError {
    /// Build a non-retryable client error.
    pub fn client(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
            status_code: status,
        }
    }

    /// Whether re-running the whole operation could plausibly succeed.
    ///
    /// Only errors caused by transient conditions qualify; malformed requests,
    /// auth failures and data problems do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RetriesExhausted { .. } | Self::Timeout { .. } | Self::HttpError(_) => true,
            Self::Interrupted { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether this error terminates the operation that raised it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::PartialResult { .. })
    }
}

/// Result type alias for Finite State operations.
pub type Result<T> = core::result::Result<T, FiniteStateError>;
