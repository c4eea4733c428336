// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience utilities: bounded retry and dispatch rate limiting.
//!
//! - [`RetryPolicy`]: fixed-delay, bounded-attempt retry for store calls
//! - [`RateLimiter`]: token bucket throttling how fast keys are dispatched
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() {
//! use object_sync::resilience::RetryPolicy;
//! use object_sync::error::ReplicationError;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(5, Duration::from_secs(1));
//! let bytes = policy
//!     .execute("fetch", || async { Ok::<_, ReplicationError>(42u64) })
//!     .await;
//! assert_eq!(bytes.unwrap(), 42);
//! # }
//! ```

use crate::error::ReplicationError;
use crate::metrics;
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovLimiter,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

// =============================================================================
// Retry
// =============================================================================

/// Bounded retry with a fixed (not exponential) delay between attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Must be at least 1.
    pub max_attempts: u32,

    /// Sleep between consecutive attempts.
    #[serde(with = "crate::config::humantime_duration")]
    pub delay: Duration,
}

/// All attempts failed (or a non-retryable error ended the loop early).
#[derive(Debug)]
pub struct RetryExhausted {
    /// Attempts actually made.
    pub attempts: u32,
    /// Error from the final attempt.
    pub last_error: ReplicationError,
}

impl RetryExhausted {
    /// Convert into the error reported for a per-key object operation.
    ///
    /// A retryable error that survived every attempt becomes
    /// [`ReplicationError::PermanentObject`]; a non-retryable one (absent
    /// object, staging failure) is passed through unchanged.
    pub fn into_object_error(self, operation: &'static str, key: &str) -> ReplicationError {
        if self.last_error.is_retryable() {
            ReplicationError::PermanentObject {
                operation,
                key: key.to_string(),
                attempts: self.attempts,
                last_error: self.last_error.to_string(),
            }
        } else {
            self.last_error
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Single attempt, no retry.
    #[cfg(test)]
    pub(crate) fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Worst-case time spent sleeping between attempts.
    pub fn max_total_delay(&self) -> Duration {
        self.delay * self.max_attempts.saturating_sub(1)
    }

    /// Run `f` until it succeeds, returns a non-retryable error, or the
    /// attempt budget is spent.
    ///
    /// `operation` labels logs and the retry counter.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        mut f: F,
    ) -> std::result::Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ReplicationError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match f().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(operation, attempts, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempts < max_attempts => {
                    warn!(
                        operation,
                        attempts,
                        max_attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );
                    metrics::record_retry(operation);
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!(operation, attempts, error = %e, "Operation failed, max attempts exceeded");
                    } else {
                        debug!(operation, attempts, error = %e, "Operation failed, not retryable");
                    }
                    return Err(RetryExhausted {
                        attempts,
                        last_error: e,
                    });
                }
            }
        }
    }
}

// =============================================================================
// Rate Limiting
// =============================================================================

/// Token bucket parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum tokens that can be accumulated (burst capacity).
    pub burst_size: u32,

    /// Tokens added per second (sustained rate).
    pub refill_rate: u32,
}

/// Token bucket limiter shared by all workers of a run.
pub struct RateLimiter {
    limiter: GovLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(config.refill_rate).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: GovLimiter::direct(quota),
            config,
        }
    }

    /// Wait for a token. Cancel-safe.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a token if one is available right now.
    #[cfg(test)]
    pub(crate) fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").field("config", &self.config).finish()
    }
}
