//! Public REST endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{check_auth, take_fault, SharedState};

/// Query parameters for listing projects.
#[derive(Debug, Default, Deserialize)]
pub struct ListProjectsQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// GET /api/public/v0/projects
pub async fn list_projects(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<ListProjectsQuery>,
) -> Response {
    let mut state = state.write().await;
    state.data_requests += 1;

    if let Some(response) = check_auth(&state, &headers) {
        return response;
    }
    if let Some(response) = take_fault(&mut state) {
        return response;
    }

    let limit = query.limit.unwrap_or(100);
    let offset = query.offset.unwrap_or(0);
    let projects: Vec<_> = state
        .projects
        .iter()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect();

    (StatusCode::OK, Json(projects)).into_response()
}

/// GET /api/public/v0/projects/{id}
pub async fn get_project(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let mut state = state.write().await;
    state.data_requests += 1;

    if let Some(response) = check_auth(&state, &headers) {
        return response;
    }

    match state.projects.iter().find(|p| p["id"] == id.as_str()) {
        Some(project) => (StatusCode::OK, Json(project.clone())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "Project not found",
                "message": format!("No project found with id: {id}")
            })),
        )
            .into_response(),
    }
}
