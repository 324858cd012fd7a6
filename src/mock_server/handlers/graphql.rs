//! GraphQL endpoint handler.
//!
//! Recognizes the list fields the client uses and serves them with
//! `after`/`first` cursor pagination.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_auth, take_fault, SharedState};
use crate::mock_server::state::MockState;

const DEFAULT_FIRST: usize = 100;

/// GraphQL request body.
#[derive(Debug, Deserialize)]
pub struct GraphQlRequest {
    pub query: String,
    #[serde(default)]
    pub variables: Value,
}

/// POST /api/v1/graphql
pub async fn graphql(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<GraphQlRequest>,
) -> Response {
    let mut state = state.write().await;
    state.data_requests += 1;

    if let Some(response) = check_auth(&state, &headers) {
        return response;
    }
    if headers.get("Organization-Context").is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Organization-Context header is required" })),
        )
            .into_response();
    }
    if let Some(response) = take_fault(&mut state) {
        return response;
    }

    let variables = &request.variables;
    let filter = variables.get("filter").cloned().unwrap_or(Value::Null);
    let query = request.query.as_str();

    if query.contains("_allFindingsMeta") {
        let count = matching_findings(&state, &filter).len();
        return data(json!({ "_allFindingsMeta": { "count": count } }));
    }

    let (field, records) = if query.contains("allAssetVersions") {
        ("allAssetVersions", matching_asset_versions(&state, &filter))
    } else if query.contains("allAssets") {
        ("allAssets", matching_assets(&state, &filter))
    } else if query.contains("allGroups") {
        ("allGroups", state.business_units.clone())
    } else if query.contains("allUsers") {
        ("allUsers", state.users.clone())
    } else if query.contains("allFindings") {
        if let Some(av) = filter.get("assetVersionRefId").and_then(Value::as_str) {
            if state.failing_asset_versions.contains(av) {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": format!("findings for {av} unavailable") })),
                )
                    .into_response();
            }
        }
        ("allFindings", matching_findings(&state, &filter))
    } else if query.contains("allSoftwareComponentInstances") {
        (
            "allSoftwareComponentInstances",
            matching_components(&state, &filter),
        )
    } else if query.contains("allProducts") {
        ("allProducts", matching_products(&state, &filter))
    } else {
        return graphql_error("Unknown query field", "GRAPHQL_VALIDATION_FAILED");
    };

    let after = variables
        .get("after")
        .and_then(Value::as_str)
        .map(str::to_string);
    let first = variables
        .get("first")
        .and_then(Value::as_u64)
        .map_or(DEFAULT_FIRST, |n| n as usize);
    state.cursors_seen.push(after.clone());

    let start = match &after {
        None => 0,
        Some(cursor) => match records.iter().position(|r| r["_cursor"] == cursor.as_str()) {
            Some(index) => index + 1,
            None => return graphql_error("Invalid cursor", "BAD_USER_INPUT"),
        },
    };

    let page: Vec<Value> = records.into_iter().skip(start).take(first).collect();
    let mut body = serde_json::Map::new();
    body.insert(field.to_string(), Value::Array(page));
    data(Value::Object(body))
}

fn data(data: Value) -> Response {
    (StatusCode::OK, Json(json!({ "data": data }))).into_response()
}

fn graphql_error(message: &str, code: &str) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "data": null,
            "errors": [{ "message": message, "extensions": { "code": code } }]
        })),
    )
        .into_response()
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
}

fn matching_asset_versions(state: &MockState, filter: &Value) -> Vec<Value> {
    let id = str_at(filter, &["id"]);
    let asset = str_at(filter, &["asset", "id"]);
    let group = str_at(filter, &["group", "id"]);

    state
        .asset_versions
        .iter()
        .filter(|av| id.map_or(true, |id| str_at(av, &["id"]) == Some(id)))
        .filter(|av| asset.map_or(true, |a| str_at(av, &["asset", "id"]) == Some(a)))
        .filter(|av| group.map_or(true, |g| str_at(av, &["asset", "group", "id"]) == Some(g)))
        .cloned()
        .collect()
}

fn matching_assets(state: &MockState, filter: &Value) -> Vec<Value> {
    let id = str_at(filter, &["id"]);
    let group = str_at(filter, &["group", "id"]);

    state
        .assets
        .iter()
        .filter(|a| id.map_or(true, |id| str_at(a, &["id"]) == Some(id)))
        .filter(|a| group.map_or(true, |g| str_at(a, &["group", "id"]) == Some(g)))
        .cloned()
        .collect()
}

fn categories(filter: &Value) -> Vec<String> {
    filter
        .get("AND")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|clause| clause.get("OR").and_then(Value::as_array))
        .flatten()
        .filter_map(|or| or.get("category_in").and_then(Value::as_array))
        .flatten()
        .filter_map(|c| c.as_str().map(str::to_string))
        .collect()
}

fn matching_findings(state: &MockState, filter: &Value) -> Vec<Value> {
    let av = str_at(filter, &["assetVersionRefId"]);
    let id = str_at(filter, &["id"]);
    let severity = str_at(filter, &["severity"]);
    let categories = categories(filter);

    state
        .findings
        .iter()
        .filter(|(owner, _)| av.map_or(true, |av| owner == av))
        .map(|(_, f)| f)
        .filter(|f| id.map_or(true, |id| str_at(f, &["id"]) == Some(id)))
        .filter(|f| severity.map_or(true, |s| str_at(f, &["severity"]) == Some(s)))
        .filter(|f| {
            categories.is_empty()
                || str_at(f, &["category"]).is_some_and(|c| categories.iter().any(|x| x == c))
        })
        .cloned()
        .collect()
}

/// Name and version filters of a component search.
fn matches_search(component: &Value, filter: &Value) -> bool {
    let field = |key: &str| str_at(component, &[key]).unwrap_or_default();
    let name = field("name");
    let version = field("version");

    str_at(filter, &["name"]).map_or(true, |n| name == n)
        && str_at(filter, &["name_like"]).map_or(true, |n| name.eq_ignore_ascii_case(n))
        && str_at(filter, &["name_contains"])
            .map_or(true, |n| name.to_lowercase().contains(&n.to_lowercase()))
        && str_at(filter, &["version"]).map_or(true, |v| version == v)
        && str_at(filter, &["version_contains"]).map_or(true, |v| version.contains(v))
}

fn matching_components(state: &MockState, filter: &Value) -> Vec<Value> {
    let av = str_at(filter, &["assetVersionRefId"]);
    let types: Vec<&str> = filter
        .get("type_in")
        .and_then(Value::as_array)
        .map(|t| t.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    state
        .components
        .iter()
        .filter(|(owner, _)| av.map_or(true, |av| owner == av))
        .filter(|(_, c)| {
            types.is_empty() || str_at(c, &["type"]).is_some_and(|t| types.contains(&t))
        })
        .filter(|(_, c)| matches_search(c, filter))
        .map(|(owner, c)| with_asset_version(state, owner, c))
        .collect()
}

/// Attach the owning asset version the way search results carry it.
fn with_asset_version(state: &MockState, owner: &str, component: &Value) -> Value {
    let mut component = component.clone();
    if let Some(av) = state
        .asset_versions
        .iter()
        .find(|av| str_at(av, &["id"]) == Some(owner))
    {
        component["assetVersion"] = json!({
            "id": av["id"],
            "name": av["name"],
            "asset": {"id": av["asset"]["id"], "name": av["asset"]["name"]}
        });
    }
    component
}

fn matching_products(state: &MockState, filter: &Value) -> Vec<Value> {
    let id = str_at(filter, &["id"]);
    state
        .products
        .iter()
        .filter(|p| id.map_or(true, |id| str_at(p, &["id"]) == Some(id)))
        .cloned()
        .collect()
}
