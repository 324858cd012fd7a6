//! Rate-limit aware retry policy.
//!
//! [`call_with_retry`] wraps a single transport call with exponential
//! backoff, jitter, an attempt ceiling and an optional hard timeout. The
//! decision for each failure is made by [`RetryPolicy::decide`]:
//!
//! | Outcome | Action |
//! |---|---|
//! | `RateLimited` | wait `retry_after` if given, else backoff; retry |
//! | `Server` / `Network` | backoff; retry up to `max_attempts` |
//! | `Client` | stop |
//! | `Unauthorized` | re-issue the token once and retry once |

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::auth::{AuthProvider, SessionToken};
use crate::error::{FiniteStateError, Result};
use crate::transport::TransportError;

/// Backoff parameters threaded through every request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor applied per retry.
    pub multiplier: f64,
    /// Upper bound for a single computed delay.
    pub max_delay: Duration,
    /// Fraction of the delay randomly added or removed (0.0 - 1.0).
    pub jitter: f64,
    /// Hard limit for the whole logical operation, sleeps included.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
            timeout: None,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Sleep this long, then try again.
    RetryAfter(Duration),
    /// Get a fresh token, then try again.
    Reauthenticate,
    /// Give up.
    Stop,
}

impl RetryPolicy {
    /// A policy with the given ceiling and no waiting. Handy in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            jitter: 0.0,
            ..Self::default()
        }
    }

    /// Set the attempt ceiling.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base delay and multiplier.
    #[must_use]
    pub fn with_backoff(mut self, base_delay: Duration, multiplier: f64) -> Self {
        self.base_delay = base_delay;
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter fraction.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Set the hard timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Exponential delay before retry number `retry` (1-based), without jitter.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Backoff delay with jitter applied.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.backoff_delay(retry);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        delay.mul_f64((1.0 + factor).max(0.0))
    }

    /// Classify a failure seen on attempt number `attempt` (1-based).
    pub fn decide(&self, error: &TransportError, attempt: u32) -> RetryDecision {
        match error {
            TransportError::Unauthorized(_) => RetryDecision::Reauthenticate,
            TransportError::Client { .. } => RetryDecision::Stop,
            _ if attempt >= self.max_attempts => RetryDecision::Stop,
            TransportError::RateLimited {
                retry_after: Some(hint),
            } => RetryDecision::RetryAfter(*hint),
            _ => RetryDecision::RetryAfter(self.delay_for(attempt)),
        }
    }
}

/// Run `thunk` under `policy`, fetching tokens from `auth`.
///
/// The thunk receives the token to send and performs exactly one transport
/// call. A token re-issue after `Unauthorized` grants one extra attempt that
/// does not count against `max_attempts`.
///
/// # Errors
///
/// - [`FiniteStateError::Client`] for non-retryable rejections
/// - [`FiniteStateError::Auth`] if the token cannot be obtained or is still
///   rejected after one re-issue
/// - [`FiniteStateError::RetriesExhausted`] with the attempt count and last
///   outcome once the ceiling is hit
/// - [`FiniteStateError::Timeout`] when the hard timeout elapses
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    auth: &AuthProvider,
    mut thunk: F,
) -> Result<T>
where
    F: FnMut(SessionToken) -> Fut,
    Fut: Future<Output = core::result::Result<T, TransportError>>,
{
    let started = Instant::now();
    let deadline = policy.timeout.map(|t| started + t);
    let mut token = auth.get_token().await?;
    let mut attempts: u32 = 0;
    let mut reissued = false;

    loop {
        attempts += 1;

        let outcome = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, thunk(token.clone())).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(FiniteStateError::Timeout {
                        attempts,
                        elapsed: started.elapsed(),
                    })
                }
            },
            None => thunk(token.clone()).await,
        };

        let error = match outcome {
            Ok(value) => {
                if attempts > 1 {
                    tracing::debug!(attempts, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        match policy.decide(&error, attempts) {
            RetryDecision::Stop => {
                return Err(match error {
                    TransportError::Client { status, message } => {
                        FiniteStateError::client(Some(status), message)
                    }
                    last => {
                        tracing::error!(attempts, error = %last, "retry budget exhausted");
                        FiniteStateError::RetriesExhausted { attempts, last }
                    }
                });
            }
            RetryDecision::Reauthenticate => {
                if reissued {
                    return Err(FiniteStateError::Auth(format!(
                        "request rejected after token re-issue: {error}"
                    )));
                }
                reissued = true;
                attempts -= 1;
                tracing::info!("request unauthorized, re-issuing session token");
                token = auth.reissue(&token).await?;
            }
            RetryDecision::RetryAfter(delay) => {
                if let Some(deadline) = deadline {
                    if Instant::now() + delay > deadline {
                        return Err(FiniteStateError::Timeout {
                            attempts,
                            elapsed: started.elapsed(),
                        });
                    }
                }
                tracing::warn!(
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
