//! Timestamp and nonce sources
//!
//! Signing is a pure function of its inputs; wall-clock timestamps and
//! monotonic nonces are injected so the engine stays deterministic under
//! test. Nonces increase strictly within a process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock source for signing timestamps.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since epoch.
    fn now_ms(&self) -> i64;
}

/// System wall clock.
#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Render a millisecond timestamp as the ISO-8601 form venues expect,
/// e.g. `2024-01-15T10:30:00.000Z`.
pub fn iso_from_ms(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Source of strictly increasing nonces.
pub trait NonceSource: Send + Sync {
    /// Next nonce; every call returns a value strictly greater than the last.
    fn next(&self) -> u64;
}

/// Microsecond-clock nonce that never repeats or goes backwards, even when
/// called faster than the clock ticks or across clock adjustments.
#[derive(Debug, Default)]
pub struct MonotonicNonce {
    last: AtomicU64,
}

impl MonotonicNonce {
    /// Fresh source starting at the current microsecond clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NonceSource for MonotonicNonce {
    fn next(&self) -> u64 {
        let now_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);

        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_us.max(prev + 1);
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}
