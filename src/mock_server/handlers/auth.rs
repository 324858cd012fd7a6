//! Token endpoint handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use super::SharedState;

/// Client-credentials token request.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub audience: Option<String>,
    pub grant_type: String,
}

/// POST /api/v1/auth/token
pub async fn issue_token(
    State(state): State<SharedState>,
    Json(request): Json<TokenRequest>,
) -> impl IntoResponse {
    if request.grant_type != "client_credentials" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "unsupported_grant_type" })),
        );
    }

    let mut state = state.write().await;
    if let Some((id, secret)) = &state.credentials {
        if *id != request.client_id || *secret != request.client_secret {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "access_denied" })),
            );
        }
    }

    let token = state.issue_token();
    (
        StatusCode::OK,
        Json(json!({
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": state.token_ttl,
        })),
    )
}
