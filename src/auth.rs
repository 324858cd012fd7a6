//! Client-credential authentication.
//!
//! [`AuthProvider`] owns the process-wide [`SessionToken`]. Every refresh,
//! whether triggered by expiry or by a rejected request, goes through one
//! async mutex so concurrent callers share a single token exchange.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::config::{ApiEndpoints, Credentials};
use crate::error::{FiniteStateError, Result};

/// Tokens are treated as expired this long before the server says so.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// A bearer token plus the bookkeeping needed to tell fresh from stale.
#[derive(Clone)]
pub struct SessionToken {
    value: Arc<str>,
    generation: u64,
    expires_at: Option<Instant>,
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("generation", &self.generation)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl SessionToken {
    /// Wrap a raw token value. Mostly useful for tests and static tokens.
    pub fn new(value: impl Into<Arc<str>>, generation: u64, expires_at: Option<Instant>) -> Self {
        Self {
            value: value.into(),
            generation,
            expires_at,
        }
    }

    /// The raw bearer value. Do not log this.
    pub fn secret(&self) -> &str {
        &self.value
    }

    /// Monotonic issue counter; higher means newer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the token should no longer be sent.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| Instant::now() + EXPIRY_SKEW >= at)
    }
}

/// A token as returned by the token endpoint, before the provider stamps it.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedToken {
    /// Bearer value.
    pub access_token: String,
    /// Lifetime in seconds, when the endpoint reports one.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Exchanges credentials for a token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Perform one exchange.
    async fn exchange(&self, credentials: &Credentials) -> Result<IssuedToken>;

    /// Forget `token`; the server rejected it or the caller invalidated it.
    async fn discard(&self, _credentials: &Credentials, _token: &str) {}
}

/// OAuth client-credentials exchange against the platform's token endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenExchange {
    http: Client,
    token_url: Url,
    audience: String,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    audience: &'a str,
    grant_type: &'static str,
}

impl HttpTokenExchange {
    /// Create an exchange for the given endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the token URL is invalid.
    pub fn new(endpoints: &ApiEndpoints) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(FiniteStateError::HttpError)?;
        Ok(Self {
            http,
            token_url: Url::parse(&endpoints.token_url)?,
            audience: endpoints.audience.clone(),
        })
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    #[tracing::instrument(skip_all, fields(client_id = credentials.client_id()))]
    async fn exchange(&self, credentials: &Credentials) -> Result<IssuedToken> {
        let body = TokenRequest {
            client_id: credentials.client_id(),
            client_secret: credentials.client_secret(),
            audience: &self.audience,
            grant_type: "client_credentials",
        };

        let response = self
            .http
            .post(self.token_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(FiniteStateError::HttpError)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FiniteStateError::Auth(format!(
                "token exchange returned {}: {text}",
                status.as_u16()
            )));
        }

        let issued: IssuedToken = response.json().await.map_err(FiniteStateError::HttpError)?;
        if issued.access_token.is_empty() {
            return Err(FiniteStateError::Auth(
                "token endpoint returned an empty access_token".to_string(),
            ));
        }
        Ok(issued)
    }
}

/// Caches the session token and serializes refreshes.
pub struct AuthProvider {
    credentials: Credentials,
    exchange: Arc<dyn TokenExchange>,
    cached: Mutex<Option<SessionToken>>,
    generation: AtomicU64,
    exchanges: AtomicU64,
}

impl std::fmt::Debug for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthProvider")
            .field("credentials", &self.credentials)
            .field("exchanges", &self.exchange_count())
            .finish_non_exhaustive()
    }
}

impl AuthProvider {
    /// Create a provider using the given exchange.
    pub fn new(credentials: Credentials, exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            credentials,
            exchange,
            cached: Mutex::new(None),
            generation: AtomicU64::new(0),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Create a provider that talks to the platform's token endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the token URL is invalid.
    pub fn http(credentials: Credentials, endpoints: &ApiEndpoints) -> Result<Self> {
        let exchange = HttpTokenExchange::new(endpoints)?;
        Ok(Self::new(credentials, Arc::new(exchange)))
    }

    /// Like [`AuthProvider::http`], but reuses tokens cached under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token URL is invalid.
    pub fn http_cached(
        credentials: Credentials,
        endpoints: &ApiEndpoints,
        dir: impl Into<std::path::PathBuf>,
    ) -> Result<Self> {
        let exchange = HttpTokenExchange::new(endpoints)?;
        let cache = crate::token_cache::FileTokenCache::new(Arc::new(exchange), dir);
        Ok(Self::new(credentials, Arc::new(cache)))
    }

    /// The credentials this provider exchanges.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// How many token exchanges have been performed.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::SeqCst)
    }

    /// Return the cached token, exchanging credentials if there is none or
    /// it has expired.
    ///
    /// # Errors
    ///
    /// Returns [`FiniteStateError::Auth`] if credentials are incomplete or the
    /// exchange is rejected.
    pub async fn get_token(&self) -> Result<SessionToken> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.clone());
        }
        if cached.is_some() {
            tracing::debug!("session token expired, refreshing");
        }
        let token = self.exchange_locked().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Replace a token the server rejected.
    ///
    /// If another caller already refreshed past `stale`, the newer token is
    /// returned without a second exchange.
    ///
    /// # Errors
    ///
    /// Returns [`FiniteStateError::Auth`] if the exchange fails.
    pub async fn reissue(&self, stale: &SessionToken) -> Result<SessionToken> {
        let mut cached = self.cached.lock().await;
        if let Some(current) = cached.as_ref() {
            if current.generation > stale.generation && !current.is_expired() {
                tracing::debug!(
                    generation = current.generation,
                    "token already reissued by another task"
                );
                return Ok(current.clone());
            }
        }
        self.exchange.discard(&self.credentials, stale.secret()).await;
        let token = self.exchange_locked().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next call exchanges again.
    pub async fn invalidate(&self) {
        if let Some(token) = self.cached.lock().await.take() {
            self.exchange.discard(&self.credentials, token.secret()).await;
        }
    }

    /// Must be called with `cached` locked.
    async fn exchange_locked(&self) -> Result<SessionToken> {
        if !self.credentials.is_complete() {
            return Err(FiniteStateError::Auth(
                "client id and client secret are required".to_string(),
            ));
        }

        self.exchanges.fetch_add(1, Ordering::SeqCst);
        let issued = self.exchange.exchange(&self.credentials).await?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let expires_at = issued
            .expires_in
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        tracing::info!(generation, "obtained session token");
        Ok(SessionToken::new(issued.access_token, generation, expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingExchange {
        calls: AtomicU32,
        expires_in: Option<u64>,
    }

    #[async_trait]
    impl TokenExchange for CountingExchange {
        async fn exchange(&self, _credentials: &Credentials) -> Result<IssuedToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(IssuedToken {
                access_token: format!("token-{n}"),
                expires_in: self.expires_in,
            })
        }
    }

    fn provider(expires_in: Option<u64>) -> (AuthProvider, Arc<CountingExchange>) {
        let exchange = Arc::new(CountingExchange {
            calls: AtomicU32::new(0),
            expires_in,
        });
        let provider = AuthProvider::new(
            Credentials::new("id", "secret", "org"),
            exchange.clone(),
        );
        (provider, exchange)
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let (provider, exchange) = provider(None);
        let first = provider.get_token().await.unwrap();
        let second = provider.get_token().await.unwrap();
        assert_eq!(first.secret(), second.secret());
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_auth_error() {
        let exchange = Arc::new(CountingExchange {
            calls: AtomicU32::new(0),
            expires_in: None,
        });
        let provider = AuthProvider::new(Credentials::new("", "", "org"), exchange.clone());
        let err = provider.get_token().await.unwrap_err();
        assert!(matches!(err, FiniteStateError::Auth(_)));
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reissue_replaces_stale_token() {
        let (provider, _) = provider(None);
        let stale = provider.get_token().await.unwrap();
        let fresh = provider.reissue(&stale).await.unwrap();
        assert_eq!(fresh.secret(), "token-2");
        assert!(fresh.generation() > stale.generation());
        assert_eq!(provider.get_token().await.unwrap().secret(), "token-2");
    }

    #[tokio::test]
    async fn test_concurrent_reissue_is_single_flight() {
        let (provider, exchange) = provider(None);
        let provider = Arc::new(provider);
        let stale = provider.get_token().await.unwrap();

        let a = {
            let provider = provider.clone();
            let stale = stale.clone();
            tokio::spawn(async move { provider.reissue(&stale).await })
        };
        let b = {
            let provider = provider.clone();
            let stale = stale.clone();
            tokio::spawn(async move { provider.reissue(&stale).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!(a.secret(), b.secret());
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_refreshed_once_for_concurrent_callers() {
        let (provider, exchange) = provider(Some(60));
        let provider = Arc::new(provider);
        provider.get_token().await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.get_token().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().secret(), "token-2");
        }
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_token_debug_hides_value() {
        let token = SessionToken::new("super-secret", 1, None);
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
