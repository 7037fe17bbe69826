//! Per-exchange circuit breakers
//!
//! Failure-counting fuses that fast-fail requests while a venue is down.
//! Fuses install lazily on first use, open after `max_failures` melts inside
//! `window_ms`, and close again after `reset_ms` or an explicit reset. Rate
//! limiting (HTTP 429) and client errors never melt; server unavailability
//! does.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::TransportErrorKind;
use crate::telemetry::{TelemetryEvent, TelemetryKind, TelemetrySink, TracingTelemetry};

/// Breaker configuration. `enabled = false` or `max_failures = 0` disables
/// the breaker entirely.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Master switch
    pub enabled: bool,
    /// Melts inside the window before the fuse opens; 0 disables
    pub max_failures: u32,
    /// Failure-counting window
    pub window_ms: u64,
    /// Time an open fuse stays open before auto-closing
    pub reset_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failures: 5,
            window_ms: 10_000,
            reset_ms: 15_000,
        }
    }
}

impl CircuitBreakerConfig {
    fn active(&self) -> bool {
        self.enabled && self.max_failures > 0
    }
}

/// Circuit state of an installed fuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Failing, requests are rejected
    Open,
}

/// Externally visible breaker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitStatus {
    /// Installed and passing requests
    Closed,
    /// Installed and rejecting requests
    Open,
    /// No request has touched this exchange yet
    NotInstalled,
}

/// Admission decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDecision {
    /// Proceed
    Ok,
    /// The fuse is open; fail fast
    Blown,
}

/// Classified outcome of a dispatched request, fed back into the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// HTTP response received with this status
    Status(u16),
    /// Transport-level failure
    Transport(TransportErrorKind),
}

impl RequestOutcome {
    /// Whether this outcome advances the failure counter.
    ///
    /// 5xx and every transport failure melt. 429 is a rate-limit concern,
    /// other 4xx are client errors, 2xx/3xx are successes; none of those
    /// melt.
    pub fn melts(&self) -> bool {
        match self {
            RequestOutcome::Transport(_) => true,
            RequestOutcome::Status(status) => *status >= 500,
        }
    }
}

#[derive(Debug)]
struct Fuse {
    state: CircuitState,
    melts: VecDeque<i64>,
    opened_at: Option<i64>,
}

impl Default for Fuse {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            melts: VecDeque::new(),
            opened_at: None,
        }
    }
}

/// Process-wide registry of per-exchange fuses.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    fuses: DashMap<String, Fuse>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    /// Registry with the default tracing telemetry sink.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_telemetry(config, Arc::new(TracingTelemetry))
    }

    /// Registry with a custom telemetry sink.
    pub fn with_telemetry(config: CircuitBreakerConfig, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            config,
            fuses: DashMap::new(),
            telemetry,
        }
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Close the fuse if its open period has elapsed. Returns the state the
    /// fuse is left in.
    fn auto_close_if_due(&self, exchange: &str, fuse: &mut Fuse, now: i64) -> CircuitState {
        if fuse.state == CircuitState::Open {
            if let Some(opened_at) = fuse.opened_at {
                if now - opened_at >= self.config.reset_ms as i64 {
                    fuse.state = CircuitState::Closed;
                    fuse.melts.clear();
                    fuse.opened_at = None;
                    self.telemetry
                        .emit(TelemetryEvent::now(TelemetryKind::CircuitClosed, exchange));
                }
            }
        }
        fuse.state
    }

    /// Admission check; installs the fuse lazily. Open fuses reject and
    /// emit a rejection event.
    pub fn check(&self, exchange: &str) -> CircuitDecision {
        if !self.config.active() {
            return CircuitDecision::Ok;
        }

        let now = Self::now_ms();
        let mut fuse = self.fuses.entry(exchange.to_string()).or_default();
        match self.auto_close_if_due(exchange, &mut fuse, now) {
            CircuitState::Closed => CircuitDecision::Ok,
            CircuitState::Open => {
                self.telemetry
                    .emit(TelemetryEvent::now(TelemetryKind::CircuitRejected, exchange));
                CircuitDecision::Blown
            }
        }
    }

    /// Feed a request outcome back into the fuse.
    pub fn record(&self, exchange: &str, outcome: RequestOutcome) {
        if !self.config.active() {
            return;
        }

        let now = Self::now_ms();
        let mut fuse = self.fuses.entry(exchange.to_string()).or_default();

        if !outcome.melts() {
            return;
        }

        let cutoff = now - self.config.window_ms as i64;
        fuse.melts.push_back(now);
        while let Some(&ts) = fuse.melts.front() {
            if ts < cutoff {
                fuse.melts.pop_front();
            } else {
                break;
            }
        }

        debug!(
            exchange,
            melts = fuse.melts.len(),
            outcome = ?outcome,
            "circuit breaker melt"
        );

        if fuse.state == CircuitState::Closed && fuse.melts.len() >= self.config.max_failures as usize
        {
            fuse.state = CircuitState::Open;
            fuse.opened_at = Some(now);
            self.telemetry
                .emit(TelemetryEvent::now(TelemetryKind::CircuitOpen, exchange));
        }
    }

    /// Current status of an exchange's fuse.
    pub fn status(&self, exchange: &str) -> CircuitStatus {
        if !self.config.active() {
            return CircuitStatus::NotInstalled;
        }
        let now = Self::now_ms();
        match self.fuses.get_mut(exchange) {
            None => CircuitStatus::NotInstalled,
            Some(mut fuse) => match self.auto_close_if_due(exchange, &mut fuse, now) {
                CircuitState::Closed => CircuitStatus::Closed,
                CircuitState::Open => CircuitStatus::Open,
            },
        }
    }

    /// Force an exchange's fuse closed.
    pub fn reset(&self, exchange: &str) {
        if let Some(mut fuse) = self.fuses.get_mut(exchange) {
            let was_open = fuse.state == CircuitState::Open;
            fuse.state = CircuitState::Closed;
            fuse.melts.clear();
            fuse.opened_at = None;
            if was_open {
                self.telemetry
                    .emit(TelemetryEvent::now(TelemetryKind::CircuitClosed, exchange));
            }
        }
    }

    /// Status of every installed fuse, sorted by exchange id.
    pub fn all_statuses(&self) -> Vec<(String, CircuitStatus)> {
        let mut out: Vec<(String, CircuitStatus)> = self
            .fuses
            .iter()
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>()
            .into_iter()
            .map(|exchange| {
                let status = self.status(&exchange);
                (exchange, status)
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::test_support::RecordingTelemetry;

    fn registry(max_failures: u32, window_ms: u64, reset_ms: u64) -> (CircuitBreakerRegistry, RecordingTelemetry) {
        let telemetry = RecordingTelemetry::new();
        let registry = CircuitBreakerRegistry::with_telemetry(
            CircuitBreakerConfig {
                enabled: true,
                max_failures,
                window_ms,
                reset_ms,
            },
            Arc::new(telemetry.clone()),
        );
        (registry, telemetry)
    }

    #[test]
    fn opens_after_max_failures_in_window() {
        let (registry, telemetry) = registry(3, 10_000, 15_000);

        assert_eq!(registry.check("testex"), CircuitDecision::Ok);
        for _ in 0..3 {
            registry.record("testex", RequestOutcome::Status(500));
        }

        assert_eq!(registry.status("testex"), CircuitStatus::Open);
        assert_eq!(registry.check("testex"), CircuitDecision::Blown);
        assert_eq!(telemetry.count(TelemetryKind::CircuitOpen), 1);
        assert_eq!(telemetry.count(TelemetryKind::CircuitRejected), 1);
    }

    #[test]
    fn non_melting_outcomes_never_trip() {
        let (registry, _) = registry(1, 10_000, 15_000);

        registry.record("testex", RequestOutcome::Status(429));
        registry.record("testex", RequestOutcome::Status(404));
        registry.record("testex", RequestOutcome::Status(400));
        registry.record("testex", RequestOutcome::Status(200));
        registry.record("testex", RequestOutcome::Status(302));

        assert_eq!(registry.status("testex"), CircuitStatus::Closed);
        assert_eq!(registry.check("testex"), CircuitDecision::Ok);
    }

    #[test]
    fn transport_failures_melt() {
        let (registry, _) = registry(2, 10_000, 15_000);
        registry.record("testex", RequestOutcome::Transport(TransportErrorKind::Timeout));
        registry.record("testex", RequestOutcome::Transport(TransportErrorKind::Dns));
        assert_eq!(registry.status("testex"), CircuitStatus::Open);
    }

    #[tokio::test]
    async fn auto_closes_after_reset_period() {
        let (registry, telemetry) = registry(1, 10_000, 50);

        registry.record("testex", RequestOutcome::Status(503));
        assert_eq!(registry.check("testex"), CircuitDecision::Blown);

        tokio::time::sleep(std::time::Duration::from_millis(70)).await;
        assert_eq!(registry.check("testex"), CircuitDecision::Ok);
        assert_eq!(telemetry.count(TelemetryKind::CircuitClosed), 1);
    }

    #[test]
    fn manual_reset_closes_immediately() {
        let (registry, telemetry) = registry(1, 10_000, 60_000);

        registry.record("testex", RequestOutcome::Status(500));
        assert_eq!(registry.status("testex"), CircuitStatus::Open);

        registry.reset("testex");
        assert_eq!(registry.status("testex"), CircuitStatus::Closed);
        assert_eq!(registry.check("testex"), CircuitDecision::Ok);
        assert_eq!(telemetry.count(TelemetryKind::CircuitClosed), 1);
    }

    #[test]
    fn exchanges_are_isolated() {
        let (registry, _) = registry(1, 10_000, 60_000);

        registry.record("downex", RequestOutcome::Status(500));
        assert_eq!(registry.check("downex"), CircuitDecision::Blown);
        assert_eq!(registry.check("upex"), CircuitDecision::Ok);
        assert_eq!(registry.status("upex"), CircuitStatus::Closed);
    }

    #[test]
    fn not_installed_until_first_touch() {
        let (registry, _) = registry(1, 10_000, 60_000);
        assert_eq!(registry.status("testex"), CircuitStatus::NotInstalled);
        registry.check("testex");
        assert_eq!(registry.status("testex"), CircuitStatus::Closed);
    }

    #[test]
    fn disabled_breaker_is_a_no_op() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            enabled: true,
            max_failures: 0,
            window_ms: 10_000,
            reset_ms: 15_000,
        });
        for _ in 0..100 {
            registry.record("testex", RequestOutcome::Status(500));
        }
        assert_eq!(registry.check("testex"), CircuitDecision::Ok);
        assert_eq!(registry.status("testex"), CircuitStatus::NotInstalled);
    }

    #[test]
    fn all_statuses_enumerates_installed_fuses() {
        let (registry, _) = registry(1, 10_000, 60_000);
        registry.check("aex");
        registry.record("bex", RequestOutcome::Status(500));

        let statuses = registry.all_statuses();
        assert_eq!(
            statuses,
            vec![
                ("aex".to_string(), CircuitStatus::Closed),
                ("bex".to_string(), CircuitStatus::Open),
            ]
        );
    }
}
