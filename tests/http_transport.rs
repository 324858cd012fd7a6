//! Transport and retry behaviour against a wiremock platform.

use std::time::{Duration, Instant};

use finite_state_sdk::{
    ApiEndpoints, Credentials, FetchOptions, FiniteStateClient, FiniteStateError, RequestDescriptor,
    RetryPolicy, TransportError,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token"))
        .and(body_partial_json(json!({
            "client_id": "id-1",
            "client_secret": "secret-1",
            "grant_type": "client_credentials"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

fn client(server: &MockServer, max_attempts: u32) -> FiniteStateClient {
    let mut options = FetchOptions::default();
    options.retry = RetryPolicy::immediate(max_attempts);
    FiniteStateClient::new(
        Credentials::new("id-1", "secret-1", "org-1"),
        &ApiEndpoints::for_base_url(&server.uri()),
    )
    .unwrap()
    .with_options(options)
}

fn query() -> RequestDescriptor {
    RequestDescriptor::graphql("query { allProducts { id } }", json!({}))
}

#[tokio::test]
async fn test_graphql_sends_bearer_and_organization_context() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/graphql"))
        .and(header("authorization", "Bearer tok-1"))
        .and(header("Organization-Context", "org-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"allProducts": [{"id": "p-1"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let data = client(&server, 3)
        .graphql("query { allProducts { id } }", json!({}))
        .await
        .unwrap();
    assert_eq!(data["allProducts"][0]["id"], "p-1");
}

#[tokio::test]
async fn test_rest_sends_x_authorization_and_params() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/public/v0/projects"))
        .and(header("X-Authorization", "tok-1"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "proj-1"}])))
        .expect(1)
        .mount(&server)
        .await;

    let request = RequestDescriptor::rest("projects", vec![("limit".to_string(), "10".to_string())]);
    let payload = client(&server, 3).send(&request).await.unwrap();
    assert_eq!(payload[0]["id"], "proj-1");
}

#[tokio::test]
async fn test_server_errors_retried_until_success() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/graphql"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"allProducts": []}})))
        .expect(1)
        .mount(&server)
        .await;

    let payload = client(&server, 3).send(&query()).await.unwrap();
    assert_eq!(payload["data"]["allProducts"], json!([]));
}

#[tokio::test]
async fn test_retries_exhausted_reports_attempts_and_last_error() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/graphql"))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({"message": "bad gateway"})))
        .expect(4)
        .mount(&server)
        .await;

    let err = client(&server, 4).send(&query()).await.unwrap_err();
    match err {
        FiniteStateError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 4);
            assert_eq!(
                last,
                TransportError::Server {
                    status: 502,
                    message: "bad gateway".to_string()
                }
            );
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limit_honours_retry_after() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/graphql"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .mount(&server)
        .await;

    let started = Instant::now();
    client(&server, 3).send(&query()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/graphql"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "bad filter"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 5).send(&query()).await.unwrap_err();
    match err {
        FiniteStateError::Client {
            status_code,
            message,
        } => {
            assert_eq!(status_code, Some(400));
            assert_eq!(message, "bad filter");
        }
        other => panic!("expected Client error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_graphql_errors_on_200_are_fatal() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{"message": "Cannot query field \"nope\""}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 5).send(&query()).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("Cannot query field"));
}

#[tokio::test]
async fn test_unauthorized_reissues_token_once() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/graphql"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(1)
        .mount(&server)
        .await;

    // One attempt is enough: the re-issue does not consume the budget.
    let client = client(&server, 1);
    client.send(&query()).await.unwrap();
    assert_eq!(client.auth().exchange_count(), 2);
}

#[tokio::test]
async fn test_persistent_unauthorized_is_auth_error() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/graphql"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let err = client(&server, 5).send(&query()).await.unwrap_err();
    assert!(matches!(err, FiniteStateError::Auth(_)));
}

#[tokio::test]
async fn test_rejected_credentials_fail_before_data_requests() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "access_denied"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server, 3).send(&query()).await.unwrap_err();
    assert!(matches!(err, FiniteStateError::Auth(_)));
}

#[tokio::test]
async fn test_timeout_bounds_whole_operation() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/graphql"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let policy = RetryPolicy::immediate(3).with_timeout(Duration::from_millis(200));
    let err = client(&server, 3)
        .send_with(&query(), &policy)
        .await
        .unwrap_err();
    assert!(matches!(err, FiniteStateError::Timeout { .. }));
}
