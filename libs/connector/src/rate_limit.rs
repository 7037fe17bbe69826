//! Sliding-window rate limiting for venue API requests
//!
//! Cost accounting per `(exchange, pool)` key: public traffic and each API
//! key are budgeted independently. Admission is a sliding window over the
//! last `period_ms` of recorded costs; `check` is non-blocking and reports
//! the wait needed, `wait` sleeps and retries. All operations serialize on
//! per-key state via the keyed map; keys never consult each other.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;
use types::RateLimitPolicy;

/// One day; entries older than this are unconditionally garbage.
pub const DEFAULT_EVICTION_HORIZON_MS: u64 = 86_400_000;

const COST_EPSILON: f64 = 1e-9;

/// The budget pool a call is charged against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pool {
    /// Unauthenticated traffic
    Public,
    /// Stable identifier of an API key
    Key(String),
}

/// Rate-limit accounting key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    /// Exchange id
    pub exchange: String,
    /// Budget pool
    pub pool: Pool,
}

impl LimitKey {
    /// Public pool for an exchange.
    pub fn public(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            pool: Pool::Public,
        }
    }

    /// Per-key pool for an exchange.
    pub fn keyed(exchange: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            pool: Pool::Key(key_id.into()),
        }
    }
}

/// Outcome of a non-blocking admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Capacity existed; the request has been recorded
    Admitted,
    /// Insufficient capacity; retry after this many milliseconds
    Delayed(u64),
}

#[derive(Debug, Default)]
struct Window {
    entries: VecDeque<(i64, f64)>,
}

impl Window {
    fn evict_before(&mut self, cutoff: i64) {
        while let Some(&(ts, _)) = self.entries.front() {
            if ts < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    fn total(&self) -> f64 {
        self.entries.iter().map(|(_, cost)| cost).sum()
    }
}

/// Process-wide sliding-window limiter, shared by all request pipelines.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    windows: DashMap<LimitKey, Window>,
    eviction_horizon_ms: u64,
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl SlidingWindowLimiter {
    /// Limiter with the default one-day eviction horizon.
    pub fn new() -> Self {
        Self::with_eviction_horizon(DEFAULT_EVICTION_HORIZON_MS)
    }

    /// Limiter with a custom eviction horizon (never below one period of
    /// any policy it will see).
    pub fn with_eviction_horizon(eviction_horizon_ms: u64) -> Self {
        Self {
            windows: DashMap::new(),
            eviction_horizon_ms,
        }
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Non-blocking admission. On `Admitted` the cost has already been
    /// recorded at the current instant; on `Delayed` nothing was recorded.
    pub fn check(
        &self,
        key: &LimitKey,
        policy: Option<&RateLimitPolicy>,
        cost: f64,
    ) -> Admission {
        let Some(policy) = policy else {
            return Admission::Admitted;
        };

        let now = Self::now_ms();
        let mut window = self.windows.entry(key.clone()).or_default();
        window.evict_before(now - policy.period_ms as i64);

        let current = window.total();
        // An oversized cost admits into an empty window instead of waiting
        // forever; the overdraft delays later traffic.
        if current + cost <= policy.requests + COST_EPSILON || window.entries.is_empty() {
            window.entries.push_back((now, cost));
            return Admission::Admitted;
        }

        let mut remaining = current;
        for &(ts, entry_cost) in window.entries.iter() {
            remaining -= entry_cost;
            if remaining + cost <= policy.requests + COST_EPSILON {
                let delay = (ts + policy.period_ms as i64 - now).max(1) as u64;
                return Admission::Delayed(delay);
            }
        }

        // Unreachable while the window is non-empty, but stay conservative.
        Admission::Delayed(policy.period_ms)
    }

    /// Blocking admission: sleep-and-recheck until capacity exists.
    /// Cancellation-safe; a cancelled waiter has recorded nothing.
    pub async fn wait(&self, key: &LimitKey, policy: Option<&RateLimitPolicy>, cost: f64) {
        loop {
            match self.check(key, policy, cost) {
                Admission::Admitted => return,
                Admission::Delayed(delay_ms) => {
                    debug!(
                        exchange = %key.exchange,
                        delay_ms,
                        "rate limit reached, waiting"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    /// Advance state without an admission check.
    pub fn record(&self, key: &LimitKey, cost: f64) {
        let now = Self::now_ms();
        self.windows
            .entry(key.clone())
            .or_default()
            .entries
            .push_back((now, cost));
    }

    /// Accumulated cost over the trailing `period_ms`.
    pub fn cost(&self, key: &LimitKey, period_ms: u64) -> f64 {
        let now = Self::now_ms();
        self.windows
            .get(key)
            .map(|window| {
                window
                    .entries
                    .iter()
                    .filter(|(ts, _)| *ts >= now - period_ms as i64)
                    .map(|(_, cost)| cost)
                    .sum()
            })
            .unwrap_or(0.0)
    }

    /// Drop all accounting for a key.
    pub fn reset(&self, key: &LimitKey) {
        self.windows.remove(key);
    }

    /// Periodic maintenance: evict entries beyond the horizon and remove
    /// keys with nothing left.
    pub fn clean(&self) {
        let cutoff = Self::now_ms() - self.eviction_horizon_ms as i64;
        self.windows.retain(|_, window| {
            window.evict_before(cutoff);
            !window.entries.is_empty()
        });
    }

    /// Number of tracked keys.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Spawn the maintenance task. The returned handle must be aborted on
    /// shutdown; the owning client does this on drop.
    pub fn spawn_cleanup(
        self: &Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                limiter.clean();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(requests: f64, period_ms: u64) -> RateLimitPolicy {
        RateLimitPolicy {
            requests,
            period_ms,
        }
    }

    #[test]
    fn admits_until_budget_exhausted() {
        let limiter = SlidingWindowLimiter::new();
        let key = LimitKey::public("testex");
        let policy = policy(2.0, 60_000);

        assert_eq!(limiter.check(&key, Some(&policy), 1.0), Admission::Admitted);
        assert_eq!(limiter.check(&key, Some(&policy), 1.0), Admission::Admitted);
        match limiter.check(&key, Some(&policy), 1.0) {
            Admission::Delayed(delay) => assert!(delay > 0),
            Admission::Admitted => panic!("third call must be delayed"),
        }
        assert_eq!(limiter.cost(&key, 60_000), 2.0);
    }

    #[test]
    fn fractional_costs_accumulate() {
        let limiter = SlidingWindowLimiter::new();
        let key = LimitKey::public("testex");
        let policy = policy(1.0, 60_000);

        for _ in 0..4 {
            assert_eq!(
                limiter.check(&key, Some(&policy), 0.25),
                Admission::Admitted
            );
        }
        assert!(matches!(
            limiter.check(&key, Some(&policy), 0.25),
            Admission::Delayed(_)
        ));
        assert!((limiter.cost(&key, 60_000) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = SlidingWindowLimiter::new();
        let public = LimitKey::public("testex");
        let keyed = LimitKey::keyed("testex", "abc123");
        let other = LimitKey::public("otherex");
        let policy = policy(1.0, 60_000);

        assert_eq!(
            limiter.check(&public, Some(&policy), 1.0),
            Admission::Admitted
        );
        assert!(matches!(
            limiter.check(&public, Some(&policy), 1.0),
            Admission::Delayed(_)
        ));

        // Exhausting the public pool affects neither the keyed pool nor
        // another exchange.
        assert_eq!(
            limiter.check(&keyed, Some(&policy), 1.0),
            Admission::Admitted
        );
        assert_eq!(
            limiter.check(&other, Some(&policy), 1.0),
            Admission::Admitted
        );
    }

    #[test]
    fn no_policy_means_unlimited() {
        let limiter = SlidingWindowLimiter::new();
        let key = LimitKey::public("testex");
        for _ in 0..1000 {
            assert_eq!(limiter.check(&key, None, 1.0), Admission::Admitted);
        }
        assert_eq!(limiter.cost(&key, 60_000), 0.0);
    }

    #[test]
    fn record_advances_cost_without_admission() {
        let limiter = SlidingWindowLimiter::new();
        let key = LimitKey::public("testex");
        limiter.record(&key, 2.5);
        limiter.record(&key, 1.5);
        assert_eq!(limiter.cost(&key, 60_000), 4.0);

        limiter.reset(&key);
        assert_eq!(limiter.cost(&key, 60_000), 0.0);
    }

    #[tokio::test]
    async fn reported_delay_is_sufficient() {
        let limiter = SlidingWindowLimiter::new();
        let key = LimitKey::public("testex");
        let policy = policy(2.0, 200);

        assert_eq!(limiter.check(&key, Some(&policy), 1.0), Admission::Admitted);
        assert_eq!(limiter.check(&key, Some(&policy), 1.0), Admission::Admitted);
        let delay = match limiter.check(&key, Some(&policy), 1.0) {
            Admission::Delayed(d) => d,
            Admission::Admitted => panic!("expected delay"),
        };
        assert!(delay <= 200, "delay {} must fit inside the period", delay);

        tokio::time::sleep(Duration::from_millis(delay + 20)).await;
        assert_eq!(limiter.check(&key, Some(&policy), 1.0), Admission::Admitted);
    }

    #[tokio::test]
    async fn wait_blocks_until_capacity() {
        let limiter = SlidingWindowLimiter::new();
        let key = LimitKey::public("testex");
        let policy = policy(1.0, 100);

        limiter.wait(&key, Some(&policy), 1.0).await;
        let started = std::time::Instant::now();
        limiter.wait(&key, Some(&policy), 1.0).await;
        assert!(
            started.elapsed() >= Duration::from_millis(50),
            "second wait should have slept"
        );
    }

    #[tokio::test]
    async fn expired_entries_stop_counting() {
        let limiter = SlidingWindowLimiter::new();
        let key = LimitKey::public("testex");
        limiter.record(&key, 3.0);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(limiter.cost(&key, 100), 0.0);
        assert!(limiter.cost(&key, 60_000) > 0.0);
    }

    #[test]
    fn cleanup_drops_idle_keys() {
        let limiter = SlidingWindowLimiter::with_eviction_horizon(0);
        let key = LimitKey::public("testex");
        limiter.record(&key, 1.0);
        assert_eq!(limiter.tracked_keys(), 1);
        // Horizon of zero evicts everything recorded before "now".
        std::thread::sleep(Duration::from_millis(5));
        limiter.clean();
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn oversized_cost_admits_into_empty_window() {
        let limiter = SlidingWindowLimiter::new();
        let key = LimitKey::public("testex");
        let policy = policy(1.0, 60_000);
        assert_eq!(limiter.check(&key, Some(&policy), 5.0), Admission::Admitted);
        assert!(matches!(
            limiter.check(&key, Some(&policy), 1.0),
            Admission::Delayed(_)
        ));
    }
}
