//! Connector configuration
//!
//! Process-scope runtime options with environment-variable overrides. Every
//! knob has a sensible default; deployments override through `LYNX_*`
//! variables or by building the struct directly.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::retry::RetryPolicy;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Process-scope connector options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorOptions {
    /// Timestamp validity window conveyed to venues that accept one
    pub recv_window_ms: u64,

    /// Insert the receive window even when the caller did not ask for it.
    /// Venues that strictly validate all sent params reject unexpected
    /// fields, so this stays off unless a deployment opts in.
    pub auto_recv_window: bool,

    /// Per-HTTP-call deadline
    pub request_timeout_ms: u64,

    /// Period for rate-limit eviction maintenance
    pub rate_limit_cleanup_interval_ms: u64,

    /// Rate-limit eviction horizon lower bound
    pub rate_limit_max_age_ms: u64,

    /// Block on rate limits (`wait`) instead of failing fast with the
    /// reported delay (`check`)
    pub blocking_rate_limit: bool,

    /// Optional broker marker appended to requests when configured
    pub broker_id: Option<String>,

    /// Circuit breaker parameters
    #[serde(skip)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry policy for recoverable errors
    #[serde(skip)]
    pub retry: RetryPolicy,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            recv_window_ms: 5_000,
            auto_recv_window: false,
            request_timeout_ms: 30_000,
            rate_limit_cleanup_interval_ms: 60_000,
            rate_limit_max_age_ms: 60_000,
            blocking_rate_limit: true,
            broker_id: None,
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::transient(),
        }
    }
}

impl ConnectorOptions {
    /// Defaults overridden from `LYNX_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            recv_window_ms: env_parse("LYNX_RECV_WINDOW_MS").unwrap_or(defaults.recv_window_ms),
            auto_recv_window: env_parse("LYNX_AUTO_RECV_WINDOW")
                .unwrap_or(defaults.auto_recv_window),
            request_timeout_ms: env_parse("LYNX_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout_ms),
            rate_limit_cleanup_interval_ms: env_parse("LYNX_RATE_LIMIT_CLEANUP_INTERVAL_MS")
                .unwrap_or(defaults.rate_limit_cleanup_interval_ms),
            rate_limit_max_age_ms: env_parse("LYNX_RATE_LIMIT_MAX_AGE_MS")
                .unwrap_or(defaults.rate_limit_max_age_ms),
            blocking_rate_limit: env_parse("LYNX_BLOCKING_RATE_LIMIT")
                .unwrap_or(defaults.blocking_rate_limit),
            broker_id: env::var("LYNX_BROKER_ID").ok().filter(|s| !s.is_empty()),
            circuit_breaker: CircuitBreakerConfig {
                enabled: env_parse("LYNX_CIRCUIT_BREAKER_ENABLED")
                    .unwrap_or(defaults.circuit_breaker.enabled),
                max_failures: env_parse("LYNX_CIRCUIT_BREAKER_MAX_FAILURES")
                    .unwrap_or(defaults.circuit_breaker.max_failures),
                window_ms: env_parse("LYNX_CIRCUIT_BREAKER_WINDOW_MS")
                    .unwrap_or(defaults.circuit_breaker.window_ms),
                reset_ms: env_parse("LYNX_CIRCUIT_BREAKER_RESET_MS")
                    .unwrap_or(defaults.circuit_breaker.reset_ms),
            },
            retry: defaults.retry,
        }
    }

    /// Per-call deadline as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Maintenance interval as a duration.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cleanup_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_defaults() {
        let options = ConnectorOptions::default();
        assert_eq!(options.recv_window_ms, 5_000);
        assert!(!options.auto_recv_window);
        assert_eq!(options.request_timeout_ms, 30_000);
        assert_eq!(options.rate_limit_cleanup_interval_ms, 60_000);
        assert_eq!(options.rate_limit_max_age_ms, 60_000);
        assert!(options.blocking_rate_limit);
        assert!(options.broker_id.is_none());
        assert!(options.circuit_breaker.enabled);
        assert_eq!(options.circuit_breaker.max_failures, 5);
        assert_eq!(options.circuit_breaker.window_ms, 10_000);
        assert_eq!(options.circuit_breaker.reset_ms, 15_000);
    }

    #[test]
    fn env_overrides_apply() {
        env::set_var("LYNX_REQUEST_TIMEOUT_MS", "1234");
        env::set_var("LYNX_BROKER_ID", "lynx-broker");

        let options = ConnectorOptions::from_env();
        assert_eq!(options.request_timeout_ms, 1234);
        assert_eq!(options.broker_id.as_deref(), Some("lynx-broker"));

        env::remove_var("LYNX_REQUEST_TIMEOUT_MS");
        env::remove_var("LYNX_BROKER_ID");
    }
}
