//! HTTP request handlers for the mock server.

pub mod auth;
pub mod graphql;
pub mod rest;

pub use auth::*;
pub use graphql::*;
pub use rest::*;

use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tokio::sync::RwLock;

use crate::mock_server::state::{Fault, MockState};

/// State handle shared by every handler.
pub type SharedState = Arc<RwLock<MockState>>;

/// Reject requests without an accepted token.
///
/// GraphQL clients send `Authorization: Bearer`; the REST API reads
/// `X-Authorization`. Either is accepted.
pub(crate) fn check_auth(state: &MockState, headers: &HeaderMap) -> Option<Response> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let raw = headers.get("X-Authorization").and_then(|v| v.to_str().ok());

    match bearer.or(raw) {
        Some(token) if state.accepts(token) => None,
        _ => Some(unauthorized()),
    }
}

/// Serve the next queued fault, if any.
pub(crate) fn take_fault(state: &mut MockState) -> Option<Response> {
    let fault = state.faults.pop_front()?;
    Some(match fault {
        Fault::RateLimited { retry_after } => {
            let body = Json(json!({ "message": "Too Many Requests" }));
            match retry_after {
                Some(secs) => (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, secs.to_string())],
                    body,
                )
                    .into_response(),
                None => (StatusCode::TOO_MANY_REQUESTS, body).into_response(),
            }
        }
        Fault::GraphQlRateLimited => (
            StatusCode::OK,
            Json(json!({
                "data": null,
                "errors": [{
                    "message": "Rate limit exceeded",
                    "extensions": { "code": "RATE_LIMITED", "retryAfter": 1 }
                }]
            })),
        )
            .into_response(),
        Fault::ServerError => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "Service Unavailable" })),
        )
            .into_response(),
        Fault::Unauthorized => unauthorized(),
    })
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Invalid or expired token" })),
    )
        .into_response()
}
