//! Retry policy for recoverable errors
//!
//! The pipeline retries transport failures, venue rate limiting, and HTTP
//! 5xx up to a small fixed count with exponential backoff. Fatal errors
//! (`invalid_*`, `insufficient_*`, and friends) are never retried;
//! rate-limit retries honor an advertised `retry_after_ms` when one exists.

use std::time::Duration;

use crate::error::{ConnectorError, ErrorVariant};

/// Exponential-backoff retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first; 1 disables retries
    pub max_attempts: u32,
    /// First backoff delay
    pub base_backoff_ms: u64,
    /// Backoff ceiling
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::transient()
    }
}

impl RetryPolicy {
    /// Transient-safe default: three attempts, one-second base backoff.
    pub fn transient() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Backoff before the given retry attempt (attempt 1 is the first
    /// retry): `min(base × 2^(attempt-1), max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }

    /// Decide whether to retry after `error`, given how many attempts have
    /// already run. Returns the delay to sleep before the next attempt.
    pub fn next_delay(&self, error: &ConnectorError, attempts_done: u32) -> Option<Duration> {
        if attempts_done >= self.max_attempts {
            return None;
        }
        if !retryable(error) {
            return None;
        }
        if let Some(retry_after) = error.retry_after_ms() {
            return Some(Duration::from_millis(retry_after));
        }
        Some(self.backoff(attempts_done))
    }
}

/// Retry eligibility: the recoverable variants, minus circuit rejections
/// (fail fast; retrying locally defeats the fuse), plus venue 5xx, which is
/// transient server unavailability even though its classification is
/// otherwise unknown.
fn retryable(error: &ConnectorError) -> bool {
    if error.kind() == types::ErrorKind::CircuitOpen {
        return false;
    }
    if error.is_recoverable() {
        return true;
    }
    matches!(
        error.variant,
        ErrorVariant::ExchangeError {
            http_status: Some(status),
            ..
        } if status >= 500
    )
}
