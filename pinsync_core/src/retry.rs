//! Bounded retry with exponential backoff for data-store calls.
//!
//! Only data-store calls go through here. Calls to the pinning backend and
//! the cluster fail per item and are picked up again on a later tick.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub const DEFAULT: Self = Self {
        max_attempts: 5,
        initial_delay_ms: 500,
        max_delay_ms: 10_000,
        backoff_multiplier: 2.0,
    };

    /// Single attempt, no retries.
    pub const NONE: Self = Self {
        max_attempts: 1,
        initial_delay_ms: 0,
        max_delay_ms: 0,
        backoff_multiplier: 1.0,
    };

    /// Delay before retry number `retry` (0-indexed), capped at `max_delay_ms`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry as i32);
        let delay_ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Runs `operation` until it succeeds or `max_attempts` is used up.
    ///
    /// Each failure is logged together with `name`. After the last attempt
    /// the last error is returned.
    pub async fn with_retry<T, F, Fut>(&self, name: &str, mut operation: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts => {
                    let delay = self.delay_for_retry(attempt - 1);
                    warn!(
                        operation = name,
                        attempt,
                        max_attempts,
                        ?delay,
                        error = %format!("{err:#}"),
                        "store call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        operation = name,
                        attempts = attempt,
                        error = %format!("{err:#}"),
                        "store call failed, giving up"
                    );
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}
