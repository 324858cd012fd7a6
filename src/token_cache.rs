//! On-disk session token cache shared across runs.
//!
//! [`FileTokenCache`] wraps another [`TokenExchange`] and keeps the last
//! issued token under `<dir>/<organization>-<client id>/token.json`. A cached
//! token is served until it is older than the cache's maximum age or past
//! the lifetime the token endpoint reported, whichever comes first.
//!
//! Cache I/O failures are logged and never fail the exchange.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{IssuedToken, TokenExchange};
use crate::config::Credentials;
use crate::error::Result;

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".tokencache";

/// Default maximum age of a cached token.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const TOKEN_FILE: &str = "token.json";

/// Cached tokens closer than this to expiry are not served.
const MIN_REMAINING: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize, Deserialize)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// A [`TokenExchange`] that reuses tokens persisted by earlier runs.
pub struct FileTokenCache {
    inner: Arc<dyn TokenExchange>,
    dir: PathBuf,
    max_age: Duration,
}

impl std::fmt::Debug for FileTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTokenCache")
            .field("dir", &self.dir)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl FileTokenCache {
    /// Cache tokens from `inner` under `dir`.
    pub fn new(inner: Arc<dyn TokenExchange>, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: dir.into(),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Override the maximum age of a cached token.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the token for `credentials` is stored.
    pub fn token_path(&self, credentials: &Credentials) -> PathBuf {
        self.dir
            .join(format!(
                "{}-{}",
                credentials.organization_context(),
                credentials.client_id()
            ))
            .join(TOKEN_FILE)
    }

    async fn load(&self, path: &Path) -> Option<CachedToken> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read token cache");
                return None;
            }
        };
        match serde_json::from_slice::<CachedToken>(&bytes) {
            Ok(cached) => Some(cached),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt token cache");
                None
            }
        }
    }

    async fn store(&self, path: &Path, cached: &CachedToken) {
        let write = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let bytes = serde_json::to_vec(cached).map_err(std::io::Error::other)?;
            tokio::fs::write(path, bytes).await
        };
        if let Err(e) = write.await {
            tracing::warn!(path = %path.display(), error = %e, "could not write token cache");
        }
    }

    async fn remove(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "removed cached token"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not remove token cache");
            }
        }
    }
}

#[async_trait]
impl TokenExchange for FileTokenCache {
    async fn exchange(&self, credentials: &Credentials) -> Result<IssuedToken> {
        let path = self.token_path(credentials);
        let now = Utc::now();

        if let Some(cached) = self.load(&path).await {
            match (cached.expires_at - now).to_std() {
                Ok(remaining) if remaining > MIN_REMAINING => {
                    tracing::debug!(path = %path.display(), "using cached token");
                    return Ok(IssuedToken {
                        access_token: cached.access_token,
                        expires_in: Some(remaining.as_secs()),
                    });
                }
                _ => {
                    tracing::info!(path = %path.display(), "cached token expired");
                    self.remove(&path).await;
                }
            }
        }

        let issued = self.inner.exchange(credentials).await?;
        let lifetime = issued
            .expires_in
            .map_or(self.max_age, |secs| Duration::from_secs(secs).min(self.max_age));
        let expires_at = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(now);
        self.store(
            &path,
            &CachedToken {
                access_token: issued.access_token.clone(),
                expires_at,
            },
        )
        .await;
        Ok(issued)
    }

    async fn discard(&self, credentials: &Credentials, token: &str) {
        let path = self.token_path(credentials);
        if self
            .load(&path)
            .await
            .is_some_and(|cached| cached.access_token == token)
        {
            self.remove(&path).await;
        }
        self.inner.discard(credentials, token).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthProvider;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingExchange {
        calls: AtomicU32,
        expires_in: Option<u64>,
    }

    impl CountingExchange {
        fn new(expires_in: Option<u64>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                expires_in,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenExchange for CountingExchange {
        async fn exchange(&self, _credentials: &Credentials) -> Result<IssuedToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(IssuedToken {
                access_token: format!("token-{n}"),
                expires_in: self.expires_in,
            })
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("client-1", "secret", "org-1")
    }

    #[tokio::test]
    async fn test_token_reused_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let inner = CountingExchange::new(Some(3600));

        let first = FileTokenCache::new(inner.clone(), dir.path());
        assert_eq!(first.exchange(&credentials()).await.unwrap().access_token, "token-1");
        assert!(first.token_path(&credentials()).ends_with("org-1-client-1/token.json"));

        let second = FileTokenCache::new(inner.clone(), dir.path());
        let reused = second.exchange(&credentials()).await.unwrap();
        assert_eq!(reused.access_token, "token-1");
        assert!(reused.expires_in.is_some_and(|secs| secs <= 3600));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_cache_entry_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let inner = CountingExchange::new(None);
        let cache = FileTokenCache::new(inner.clone(), dir.path());
        let path = cache.token_path(&credentials());

        cache
            .store(
                &path,
                &CachedToken {
                    access_token: "old".to_string(),
                    expires_at: Utc::now() - chrono::Duration::hours(1),
                },
            )
            .await;

        let issued = cache.exchange(&credentials()).await.unwrap();
        assert_eq!(issued.access_token, "token-1");
        assert_eq!(cache.load(&path).await.unwrap().access_token, "token-1");
    }

    #[tokio::test]
    async fn test_nearly_expired_entry_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let inner = CountingExchange::new(Some(3600));
        let cache = FileTokenCache::new(inner.clone(), dir.path());
        let path = cache.token_path(&credentials());

        cache
            .store(
                &path,
                &CachedToken {
                    access_token: "old".to_string(),
                    expires_at: Utc::now() + chrono::Duration::seconds(10),
                },
            )
            .await;

        assert_eq!(cache.exchange(&credentials()).await.unwrap().access_token, "token-1");
    }

    #[tokio::test]
    async fn test_max_age_caps_reported_lifetime() {
        let dir = tempfile::tempdir().unwrap();
        let inner = CountingExchange::new(Some(7 * 24 * 3600));
        let cache = FileTokenCache::new(inner.clone(), dir.path());

        cache.exchange(&credentials()).await.unwrap();
        let cached = cache.load(&cache.token_path(&credentials())).await.unwrap();
        assert!(cached.expires_at <= Utc::now() + chrono::Duration::hours(24));
    }

    #[tokio::test]
    async fn test_corrupt_cache_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let inner = CountingExchange::new(None);
        let cache = FileTokenCache::new(inner.clone(), dir.path());
        let path = cache.token_path(&credentials());
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"not json").await.unwrap();

        assert_eq!(cache.exchange(&credentials()).await.unwrap().access_token, "token-1");
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_discard_only_removes_matching_token() {
        let dir = tempfile::tempdir().unwrap();
        let inner = CountingExchange::new(None);
        let cache = FileTokenCache::new(inner.clone(), dir.path());
        let path = cache.token_path(&credentials());

        cache.exchange(&credentials()).await.unwrap();
        cache.discard(&credentials(), "someone-else").await;
        assert!(path.exists());

        cache.discard(&credentials(), "token-1").await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_rejected_cached_token_is_not_served_again() {
        let dir = tempfile::tempdir().unwrap();
        let inner = CountingExchange::new(None);
        FileTokenCache::new(inner.clone(), dir.path())
            .exchange(&credentials())
            .await
            .unwrap();

        let provider = AuthProvider::new(
            credentials(),
            Arc::new(FileTokenCache::new(inner.clone(), dir.path())),
        );
        let stale = provider.get_token().await.unwrap();
        assert_eq!(stale.secret(), "token-1");
        assert_eq!(inner.calls(), 1);

        let fresh = provider.reissue(&stale).await.unwrap();
        assert_eq!(fresh.secret(), "token-2");
        assert_eq!(inner.calls(), 2);
    }
}
