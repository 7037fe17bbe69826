//! Telemetry event contract
//!
//! The core emits a small set of operational events; sinks are pluggable.
//! The default sink forwards to `tracing` so deployments without a dedicated
//! pipeline still see the events in their logs.

use std::time::SystemTime;

use tracing::{info, warn};

/// Kinds of telemetry events the core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryKind {
    /// A circuit breaker transitioned to OPEN
    CircuitOpen,
    /// A circuit breaker transitioned to CLOSED
    CircuitClosed,
    /// A request was rejected by an open circuit breaker
    CircuitRejected,
}

impl TelemetryKind {
    /// Dotted event name, stable across sinks.
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryKind::CircuitOpen => "circuit_breaker.open",
            TelemetryKind::CircuitClosed => "circuit_breaker.closed",
            TelemetryKind::CircuitRejected => "circuit_breaker.rejected",
        }
    }
}

/// One telemetry event.
#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    /// Event kind
    pub kind: TelemetryKind,
    /// Exchange the event concerns
    pub exchange: String,
    /// Wall-clock time of the event
    pub at: SystemTime,
}

impl TelemetryEvent {
    /// Build an event stamped with the current system time.
    pub fn now(kind: TelemetryKind, exchange: impl Into<String>) -> Self {
        Self {
            kind,
            exchange: exchange.into(),
            at: SystemTime::now(),
        }
    }
}

/// Destination for telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Deliver one event. Must not block.
    fn emit(&self, event: TelemetryEvent);
}

/// Default sink: structured `tracing` events.
#[derive(Debug, Default, Clone)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        match event.kind {
            TelemetryKind::CircuitOpen => {
                warn!(event = event.kind.name(), exchange = %event.exchange, "circuit breaker opened");
            }
            TelemetryKind::CircuitClosed => {
                info!(event = event.kind.name(), exchange = %event.exchange, "circuit breaker closed");
            }
            TelemetryKind::CircuitRejected => {
                warn!(event = event.kind.name(), exchange = %event.exchange, "request rejected by open circuit");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Sink that records events for assertions.
    #[derive(Debug, Default, Clone)]
    pub struct RecordingTelemetry {
        events: Arc<Mutex<Vec<TelemetryEvent>>>,
    }

    impl RecordingTelemetry {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn kinds(&self) -> Vec<TelemetryKind> {
            self.events.lock().iter().map(|e| e.kind).collect()
        }

        pub fn count(&self, kind: TelemetryKind) -> usize {
            self.events.lock().iter().filter(|e| e.kind == kind).count()
        }
    }

    impl TelemetrySink for RecordingTelemetry {
        fn emit(&self, event: TelemetryEvent) {
            self.events.lock().push(event);
        }
    }
}
