//! E2E tests using the mock Finite State platform.
//!
//! These tests exercise full workflows against the mock server: token
//! exchange, paging, throttling, token revocation and per-asset-version
//! fan-out.

#![cfg(feature = "test-server")]

use finite_state_sdk::mock_server::{Fault, Fixtures, MockServer, MockState};
use finite_state_sdk::{
    fetch_findings_per_asset_version, find_project_by_name, get_all_business_units,
    get_all_users, get_assets, get_findings_count, get_product_asset_versions,
    get_software_components, search_sbom, Asset, AssetListQuery, AssetVersion,
    AssetVersionListQuery, FetchOptions, Finding, FindingListQuery, FiniteStateClient,
    FiniteStateError, Get, List, Project, RetryPolicy, SbomSearch, SearchMethod,
};
use finite_state_sdk::output::severity_breakdown;

fn quick_options() -> FetchOptions {
    let mut options = FetchOptions::default();
    options.retry = RetryPolicy::immediate(3);
    options
}

fn client(server: &MockServer) -> FiniteStateClient {
    server.client().unwrap().with_options(quick_options())
}

// =============================================================================
// Server Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_server_starts_on_random_port() {
    let server1 = MockServer::start().await;
    let server2 = MockServer::start().await;

    assert_ne!(server1.url(), server2.url());

    server1.shutdown().await;
    server2.shutdown().await;
}

#[tokio::test]
async fn test_server_shutdown_is_clean() {
    let server = MockServer::start().await;
    let url = server.url().to_string();

    server.shutdown().await;

    let client = reqwest::Client::new();
    let result = client.get(format!("{}/health", url)).send().await;

    assert!(result.is_err());
}

// =============================================================================
// Listing and Paging
// =============================================================================

#[tokio::test]
async fn test_list_then_get_asset_version() {
    let server = MockServer::start().await;
    let client = client(&server);

    let query = AssetVersionListQuery {
        asset_id: Some("asset-gateway".to_string()),
        ..Default::default()
    };
    let versions = AssetVersion::list_all(&client, &query).await.unwrap();
    assert_eq!(versions.len(), 2);

    let version = AssetVersion::get(&client, versions[1].id.clone())
        .await
        .unwrap();
    assert_eq!(version.id, "av-2");
    assert_eq!(version.relative_risk_score, Some(48.5));

    server.shutdown().await;
}

#[tokio::test]
async fn test_get_missing_asset_version_is_not_found() {
    let server = MockServer::start().await;
    let client = client(&server);

    let err = AssetVersion::get(&client, "av-404".to_string())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FiniteStateError::Client {
            status_code: Some(404),
            ..
        }
    ));

    server.shutdown().await;
}

#[tokio::test]
async fn test_findings_paged_by_cursor() {
    let server = MockServer::start().await;
    let client = server
        .client()
        .unwrap()
        .with_options(quick_options().with_page_size(3));

    let findings = Finding::list_all(&client, &FindingListQuery::for_asset_version("av-1"))
        .await
        .unwrap();

    assert_eq!(findings.len(), 7);
    assert_eq!(findings[0].id, "av1-f-0001");
    assert_eq!(findings[6].id, "av1-f-0007");

    let state = server.state();
    let state = state.read().await;
    assert_eq!(state.data_requests, 3);
    assert_eq!(state.cursors_seen[0], None);
    let later: Vec<&Option<String>> = state.cursors_seen[1..].iter().collect();
    assert!(later.iter().all(|c| c.is_some()));
    assert_ne!(later[0], later[1]);

    drop(state);
    server.shutdown().await;
}

#[tokio::test]
async fn test_findings_count_matches_listing() {
    let server = MockServer::start().await;
    let client = client(&server);

    let all = FindingListQuery::for_asset_version("av-1");
    assert_eq!(get_findings_count(&client, &all).await.unwrap(), 7);

    let high = FindingListQuery::for_asset_version("av-1").with_severity("HIGH");
    let count = get_findings_count(&client, &high).await.unwrap();
    let listed = Finding::list_all(&client, &high).await.unwrap();
    assert_eq!(count, listed.len() as u64);
    assert_eq!(count, 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_list_limited_stops_early() {
    let server = MockServer::start().await;
    let client = client(&server);

    let findings = Finding::list_limited(&client, &FindingListQuery::default(), 4)
        .await
        .unwrap();
    assert_eq!(findings.len(), 4);

    server.shutdown().await;
}

#[tokio::test]
async fn test_components_filtered_by_type() {
    let server = MockServer::start().await;
    let client = client(&server);

    let libraries = get_software_components(&client, "av-1", Some("LIBRARY".to_string()))
        .await
        .unwrap();
    assert_eq!(libraries.len(), 2);

    let firmware = get_software_components(&client, "av-1", Some("FIRMWARE".to_string()))
        .await
        .unwrap();
    assert!(firmware.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_rest_projects_paged_by_offset() {
    let server = MockServer::start().await;
    let client = server
        .client()
        .unwrap()
        .with_options(quick_options().with_page_size(2));

    let projects = Project::list_all(&client, &Default::default()).await.unwrap();
    assert_eq!(projects.len(), 5);
    assert_eq!(server.state().read().await.data_requests, 3);

    let project = find_project_by_name(&client, "project-4").await.unwrap();
    assert_eq!(project.id, "proj-4");
    assert_eq!(
        project.latest_version().map(|v| v.id.as_str()),
        Some("proj-4-v1")
    );

    server.shutdown().await;
}

// =============================================================================
// Throttling and Authentication
// =============================================================================

#[tokio::test]
async fn test_transient_faults_are_retried() {
    let state = Fixtures::default_scenario().with_faults([
        Fault::RateLimited { retry_after: None },
        Fault::ServerError,
    ]);
    let server = MockServer::with_state(state).await;
    let client = client(&server);

    let versions = AssetVersion::list_all(&client, &Default::default())
        .await
        .unwrap();
    assert_eq!(versions.len(), 3);
    assert_eq!(server.state().read().await.data_requests, 3);

    server.shutdown().await;
}

#[tokio::test]
async fn test_graphql_rate_limit_error_is_retried() {
    let state = Fixtures::default_scenario().with_faults([Fault::GraphQlRateLimited]);
    let server = MockServer::with_state(state).await;
    let client = client(&server);

    let products = finite_state_sdk::Product::list_all(&client, &Default::default())
        .await
        .unwrap();
    assert_eq!(products.len(), 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_faults_beyond_budget_fail() {
    let state = Fixtures::default_scenario().with_faults([
        Fault::ServerError,
        Fault::ServerError,
        Fault::ServerError,
    ]);
    let server = MockServer::with_state(state).await;
    let client = client(&server);

    let err = AssetVersion::list_all(&client, &Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FiniteStateError::Interrupted { fetched: 0, .. }));
    assert!(err.is_retryable());

    server.shutdown().await;
}

#[tokio::test]
async fn test_revoked_token_is_reissued() {
    let server = MockServer::start().await;
    let client = client(&server);

    AssetVersion::list_all(&client, &Default::default())
        .await
        .unwrap();
    server.state().write().await.revoke_all_tokens();

    let versions = AssetVersion::list_all(&client, &Default::default())
        .await
        .unwrap();
    assert_eq!(versions.len(), 3);
    assert_eq!(server.state().read().await.token_exchanges(), 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_callers_share_one_reissue() {
    let server = MockServer::start().await;
    let client = client(&server);

    client.get_token().await.unwrap();
    server.state().write().await.revoke_all_tokens();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move {
                AssetVersion::list_all(&client, &Default::default()).await
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().len(), 3);
    }

    assert_eq!(server.state().read().await.token_exchanges(), 2);
    assert_eq!(client.auth().exchange_count(), 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_wrong_credentials_send_no_data_requests() {
    let state = Fixtures::default_scenario().with_credentials("other", "other-secret");
    let server = MockServer::with_state(state).await;
    let client = client(&server);

    let err = AssetVersion::list_all(&client, &Default::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Authentication failed"));
    assert_eq!(server.state().read().await.data_requests, 0);

    server.shutdown().await;
}

// =============================================================================
// Fan-out
// =============================================================================

fn all_versions() -> Vec<String> {
    ["av-1", "av-2", "av-3"].map(String::from).to_vec()
}

#[tokio::test]
async fn test_fan_out_collects_every_asset_version() {
    let server = MockServer::start().await;
    let client = client(&server);
    let options = FetchOptions {
        retry: RetryPolicy::immediate(2),
        ..FetchOptions::fail_fast().with_page_size(2)
    };

    let results = fetch_findings_per_asset_version(
        &client,
        all_versions(),
        FindingListQuery::default(),
        &options,
    )
    .await
    .unwrap();

    assert!(!results.is_partial());
    assert_eq!(results.records.len(), 10);
    assert_eq!(results.records_for("av-1").count(), 7);
    assert_eq!(results.records_for("av-2").count(), 3);
    assert_eq!(results.records_for("av-3").count(), 0);
    assert!(results.records_for("av-2").all(|r| r.id.starts_with("av2-f-")));
    assert!(results.conflicts.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_fan_out_finding_shared_by_versions() {
    let shared = Fixtures::finding("f-shared", "HIGH", "CVE");
    let state = MockState::new()
        .with_finding("av-1", shared.clone())
        .with_findings("av-1", Fixtures::findings("own", 2))
        .with_finding("av-2", shared);
    let server = MockServer::with_state(state).await;
    let client = client(&server);

    let results = fetch_findings_per_asset_version(
        &client,
        ["av-1", "av-2"].map(String::from),
        FindingListQuery::default(),
        &quick_options(),
    )
    .await
    .unwrap();

    assert!(results.conflicts.is_empty());
    assert_eq!(results.records.len(), 3);
    assert_eq!(results.records_for("av-2").count(), 1);

    let rows = severity_breakdown(&results);
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].asset_version.as_str(), rows[0].total), ("av-1", 3));
    assert_eq!((rows[1].asset_version.as_str(), rows[1].total), ("av-2", 1));
    assert_eq!(rows[1].high, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_fan_out_best_effort_reports_failures() {
    let state = Fixtures::default_scenario().with_failing_asset_version("av-2");
    let server = MockServer::with_state(state).await;
    let client = client(&server);
    let options = FetchOptions {
        retry: RetryPolicy::immediate(2),
        ..FetchOptions::best_effort()
    };

    let results = fetch_findings_per_asset_version(
        &client,
        all_versions(),
        FindingListQuery::default(),
        &options,
    )
    .await
    .unwrap();

    assert!(results.is_partial());
    assert_eq!(results.failed_ids(), vec!["av-2".to_string()]);
    assert_eq!(results.records.len(), 7);
    assert!(results.failed[0].retryable);
    assert!(results.into_complete().is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn test_fan_out_fail_fast_aborts() {
    let state = Fixtures::default_scenario().with_failing_asset_version("av-2");
    let server = MockServer::with_state(state).await;
    let client = client(&server);
    let options = FetchOptions {
        retry: RetryPolicy::immediate(2),
        ..FetchOptions::fail_fast()
    };

    let result = fetch_findings_per_asset_version(
        &client,
        all_versions(),
        FindingListQuery::default(),
        &options,
    )
    .await;
    assert!(result.is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn test_fan_out_result_independent_of_concurrency() {
    let server = MockServer::with_state(
        MockState::new()
            .with_asset_version(Fixtures::asset_version("a", "x", "1", 1.0))
            .with_findings("a", Fixtures::findings("a", 5))
            .with_findings("b", Fixtures::findings("b", 4))
            .with_findings("c", Fixtures::findings("c", 6)),
    )
    .await;
    let client = client(&server);
    let ids = || ["c", "a", "b"].map(String::from);

    let serial = fetch_findings_per_asset_version(
        &client,
        ids(),
        FindingListQuery::default(),
        &quick_options().with_concurrency(1).with_page_size(2),
    )
    .await
    .unwrap();
    let parallel = fetch_findings_per_asset_version(
        &client,
        ids(),
        FindingListQuery::default(),
        &quick_options().with_concurrency(3).with_page_size(2),
    )
    .await
    .unwrap();

    assert_eq!(serial.records.len(), 15);
    assert_eq!(
        serde_json::to_string(&serial).unwrap(),
        serde_json::to_string(&parallel).unwrap()
    );

    server.shutdown().await;
}

// =============================================================================
// Organization Directory
// =============================================================================

#[tokio::test]
async fn test_assets_filtered_by_business_unit() {
    let server = MockServer::start().await;
    let client = client(&server);

    let all = get_assets(&client, AssetListQuery::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    let cameras = get_assets(
        &client,
        AssetListQuery {
            business_unit_id: Some("bu-2".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(cameras.len(), 1);
    assert_eq!(cameras[0].business_unit(), Some("Cameras"));
    assert_eq!(
        cameras[0].latest_version().map(|v| v.id.as_str()),
        Some("av-3")
    );

    let gateway = Asset::get(&client, "asset-gateway".to_string()).await.unwrap();
    assert_eq!(gateway.versions.len(), 2);

    let missing = Asset::get(&client, "asset-none".to_string()).await.unwrap_err();
    assert!(matches!(
        missing,
        FiniteStateError::Client {
            status_code: Some(404),
            ..
        }
    ));

    server.shutdown().await;
}

#[tokio::test]
async fn test_business_units_and_users() {
    let server = MockServer::start().await;
    let client = server
        .client()
        .unwrap()
        .with_options(quick_options().with_page_size(1));

    let units = get_all_business_units(&client).await.unwrap();
    let names: Vec<_> = units.iter().filter_map(|u| u.name.as_deref()).collect();
    assert_eq!(names, vec!["Devices", "Cameras"]);

    let users = get_all_users(&client).await.unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].email.as_deref(), Some("analyst@example.com"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_product_asset_versions() {
    let server = MockServer::start().await;
    let client = client(&server);

    let versions = get_product_asset_versions(&client, "p-1").await.unwrap();
    let ids: Vec<_> = versions.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["av-1", "av-2"]);
    assert_eq!(
        versions[0].asset.as_ref().and_then(|a| a.name.as_deref()),
        Some("gateway")
    );

    let missing = get_product_asset_versions(&client, "p-404").await.unwrap_err();
    assert!(matches!(
        missing,
        FiniteStateError::Client {
            status_code: Some(404),
            ..
        }
    ));

    let requests = server.state().read().await.data_requests;
    let empty = get_product_asset_versions(&client, "").await.unwrap_err();
    assert!(matches!(empty, FiniteStateError::InvalidArgument(_)));
    assert_eq!(server.state().read().await.data_requests, requests);

    server.shutdown().await;
}

// =============================================================================
// SBOM Search
// =============================================================================

#[tokio::test]
async fn test_search_sbom_exact_ignores_case_by_default() {
    let server = MockServer::start().await;
    let client = client(&server);

    let hits = search_sbom(&client, &SbomSearch::new("openssl")).await.unwrap();
    let ids: Vec<_> = hits.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["sc-2", "sc-3"]);
    let owner = hits[1].asset_version.as_ref().unwrap();
    assert_eq!(owner.id, "av-3");

    let strict = search_sbom(
        &client,
        &SbomSearch {
            case_sensitive: true,
            ..SbomSearch::new("openssl")
        },
    )
    .await
    .unwrap();
    assert_eq!(strict.len(), 1);
    assert_eq!(strict[0].id, "sc-2");

    server.shutdown().await;
}

#[tokio::test]
async fn test_search_sbom_contains_and_scope() {
    let server = MockServer::start().await;
    let client = client(&server);

    let search = SbomSearch {
        method: SearchMethod::Contains,
        ..SbomSearch::new("ssl")
    };
    assert_eq!(search_sbom(&client, &search).await.unwrap().len(), 3);

    let scoped = SbomSearch {
        asset_version_id: Some("av-3".to_string()),
        version: Some("3.0".to_string()),
        ..search
    };
    let hits = search_sbom(&client, &scoped).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name.as_deref(), Some("openssl-fips"));

    let blank = search_sbom(&client, &SbomSearch::new("  ")).await.unwrap_err();
    assert!(matches!(blank, FiniteStateError::InvalidArgument(_)));

    server.shutdown().await;
}

// =============================================================================
// Token Cache
// =============================================================================

#[tokio::test]
async fn test_token_cache_shared_between_clients() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let first = server.cached_client(dir.path()).unwrap();
    assert_eq!(AssetVersion::list_all(&first, &Default::default()).await.unwrap().len(), 3);

    let second = server.cached_client(dir.path()).unwrap();
    assert_eq!(get_all_users(&second).await.unwrap().len(), 2);

    assert_eq!(server.state().read().await.token_exchanges(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_revoked_cached_token_is_replaced() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let first = server.cached_client(dir.path()).unwrap();
    get_all_users(&first).await.unwrap();
    server.state().write().await.revoke_all_tokens();

    let second = server.cached_client(dir.path()).unwrap();
    assert_eq!(get_all_users(&second).await.unwrap().len(), 2);
    assert_eq!(server.state().read().await.token_exchanges(), 2);

    let third = server.cached_client(dir.path()).unwrap();
    get_all_users(&third).await.unwrap();
    assert_eq!(server.state().read().await.token_exchanges(), 2);

    server.shutdown().await;
}
