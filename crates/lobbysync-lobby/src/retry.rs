//! Bounded exponential backoff for transient store failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::LobbyError;

/// How transient store failures are retried.
///
/// The delay before retry `n` (1-based) is `base * 2^(n-1)`, capped at
/// `max`, plus a random `0..=jitter`. Only errors for which
/// [`LobbyError::is_transient`] holds are retried; everything else returns
/// on the first failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base: Duration::from_millis(100),
            max: Duration::from_secs(2),
            jitter: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }

    /// Runs `op` until it succeeds, fails terminally, or the attempt budget
    /// is spent. A spent budget surfaces as [`LobbyError::Connectivity`].
    pub async fn run<T, F, Fut>(&self, name: &str, mut op: F) -> Result<T, LobbyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LobbyError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.backoff(attempt) + self.jitter();
                    tracing::warn!(
                        op = name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(LobbyError::Store(source)) if source.is_transient() => {
                    tracing::warn!(op = name, attempts, error = %source, "giving up after retries");
                    return Err(LobbyError::Connectivity { attempts, source });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
