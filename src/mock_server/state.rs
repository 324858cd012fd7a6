//! Mock server state management.
//!
//! Provides the in-memory data store for the mock Finite State platform,
//! plus the knobs tests use to inject rate limiting and failures.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

/// A failure the server returns instead of serving the next data request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// HTTP 429, optionally with `Retry-After` seconds.
    RateLimited {
        /// `Retry-After` header value.
        retry_after: Option<u64>,
    },
    /// HTTP 200 with a GraphQL `RATE_LIMITED` error.
    GraphQlRateLimited,
    /// HTTP 503.
    ServerError,
    /// HTTP 401.
    Unauthorized,
}

/// Shared state for the mock server.
///
/// Records are stored as raw JSON in insertion order; `_cursor` values are
/// assigned when they are added.
#[derive(Debug, Default)]
pub struct MockState {
    /// Asset versions.
    pub asset_versions: Vec<Value>,

    /// Findings with the asset version they belong to.
    pub findings: Vec<(String, Value)>,

    /// Component instances with the asset version they belong to.
    pub components: Vec<(String, Value)>,

    /// Products.
    pub products: Vec<Value>,

    /// Assets.
    pub assets: Vec<Value>,

    /// Business units, served as `allGroups`.
    pub business_units: Vec<Value>,

    /// Users.
    pub users: Vec<Value>,

    /// REST projects.
    pub projects: Vec<Value>,

    /// If set, the token endpoint only accepts this client id and secret.
    pub credentials: Option<(String, String)>,

    /// Lifetime reported for issued tokens.
    pub token_ttl: Option<u64>,

    /// Tokens handed out so far; only these are accepted.
    pub issued_tokens: Vec<String>,

    /// Tokens that now get 401.
    pub revoked_tokens: HashSet<String>,

    /// Failures returned for the next data requests, in order.
    pub faults: VecDeque<Fault>,

    /// Asset versions whose findings always fail with 500.
    pub failing_asset_versions: HashSet<String>,

    /// Data requests received, including faulted ones.
    pub data_requests: usize,

    /// `after` values received by list queries, in order.
    pub cursors_seen: Vec<Option<String>>,

    next_cursor: u64,
}

impl MockState {
    /// Create a new empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create state wrapped in Arc<RwLock> for sharing.
    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }

    fn stamp(&mut self, mut record: Value) -> Value {
        self.next_cursor += 1;
        if let Value::Object(map) = &mut record {
            map.insert(
                "_cursor".to_string(),
                Value::String(format!("cursor-{:06}", self.next_cursor)),
            );
        }
        record
    }

    /// Add an asset version.
    pub fn with_asset_version(mut self, record: Value) -> Self {
        let record = self.stamp(record);
        self.asset_versions.push(record);
        self
    }

    /// Add a finding to an asset version.
    pub fn with_finding(mut self, asset_version_id: &str, record: Value) -> Self {
        let record = self.stamp(record);
        self.findings.push((asset_version_id.to_string(), record));
        self
    }

    /// Add many findings to an asset version.
    pub fn with_findings(self, asset_version_id: &str, records: Vec<Value>) -> Self {
        records
            .into_iter()
            .fold(self, |state, record| state.with_finding(asset_version_id, record))
    }

    /// Add a component instance to an asset version.
    pub fn with_component(mut self, asset_version_id: &str, record: Value) -> Self {
        let record = self.stamp(record);
        self.components.push((asset_version_id.to_string(), record));
        self
    }

    /// Add a product.
    pub fn with_product(mut self, record: Value) -> Self {
        let record = self.stamp(record);
        self.products.push(record);
        self
    }

    /// Add an asset.
    pub fn with_asset(mut self, record: Value) -> Self {
        let record = self.stamp(record);
        self.assets.push(record);
        self
    }

    /// Add a business unit.
    pub fn with_business_unit(mut self, record: Value) -> Self {
        let record = self.stamp(record);
        self.business_units.push(record);
        self
    }

    /// Add a user.
    pub fn with_user(mut self, record: Value) -> Self {
        let record = self.stamp(record);
        self.users.push(record);
        self
    }

    /// Add a REST project.
    pub fn with_project(mut self, record: Value) -> Self {
        self.projects.push(record);
        self
    }

    /// Require these client credentials at the token endpoint.
    pub fn with_credentials(mut self, client_id: &str, client_secret: &str) -> Self {
        self.credentials = Some((client_id.to_string(), client_secret.to_string()));
        self
    }

    /// Report this lifetime for issued tokens.
    pub fn with_token_ttl(mut self, seconds: u64) -> Self {
        self.token_ttl = Some(seconds);
        self
    }

    /// Queue failures for the next data requests.
    pub fn with_faults(mut self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.faults.extend(faults);
        self
    }

    /// Make findings of an asset version always fail.
    pub fn with_failing_asset_version(mut self, asset_version_id: &str) -> Self {
        self.failing_asset_versions
            .insert(asset_version_id.to_string());
        self
    }

    /// Issue a new token.
    pub fn issue_token(&mut self) -> String {
        let token = format!("mock-token-{}", self.issued_tokens.len() + 1);
        self.issued_tokens.push(token.clone());
        token
    }

    /// Number of token exchanges served.
    pub fn token_exchanges(&self) -> usize {
        self.issued_tokens.len()
    }

    /// Make every token issued so far invalid.
    pub fn revoke_all_tokens(&mut self) {
        self.revoked_tokens
            .extend(self.issued_tokens.iter().cloned());
    }

    /// Whether a bearer token is currently accepted.
    pub fn accepts(&self, token: &str) -> bool {
        self.issued_tokens.iter().any(|t| t == token) && !self.revoked_tokens.contains(token)
    }

    /// Findings of one asset version.
    pub fn findings_for(&self, asset_version_id: &str) -> Vec<&Value> {
        self.findings
            .iter()
            .filter(|(av, _)| av == asset_version_id)
            .map(|(_, f)| f)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursors_are_unique_and_ordered() {
        let state = MockState::new()
            .with_asset_version(json!({"id": "av-1"}))
            .with_finding("av-1", json!({"id": "f-1"}))
            .with_finding("av-1", json!({"id": "f-2"}));

        let cursors: Vec<&str> = state
            .findings
            .iter()
            .map(|(_, f)| f["_cursor"].as_str().unwrap())
            .collect();
        assert_eq!(cursors, vec!["cursor-000002", "cursor-000003"]);
        assert_eq!(state.findings_for("av-1").len(), 2);
    }

    #[test]
    fn test_token_revocation() {
        let mut state = MockState::new();
        let token = state.issue_token();
        assert!(state.accepts(&token));
        state.revoke_all_tokens();
        assert!(!state.accepts(&token));
        assert!(!state.accepts("never-issued"));

        let fresh = state.issue_token();
        assert!(state.accepts(&fresh));
        assert_eq!(state.token_exchanges(), 2);
    }
}
