//! # Lynx Connector - Unified Exchange Request Pipeline
//!
//! ## Purpose
//!
//! One implementation of the request-processing machinery that sits between
//! a unified API call and a hundred heterogeneous exchange backends. The
//! per-exchange differences (auth scheme, request encoding, rate-limit
//! policy, error taxonomy, WebSocket channel naming) live in declarative
//! catalog data; this crate interprets it.
//!
//! ## Components
//!
//! - **Signing engine** ([`signing`]): HMAC strategies selected per exchange,
//!   producing signed HTTP requests and WebSocket auth frames.
//! - **Rate limiter** ([`rate_limit`]): per-(exchange, credential-pool)
//!   sliding-window cost accounting with blocking and non-blocking modes.
//! - **Circuit breaker** ([`circuit_breaker`]): per-exchange failure counting
//!   that fast-fails requests during venue outages.
//! - **Error classifier** ([`classify`]): maps transport failures, HTTP
//!   statuses, and venue error codes onto a structured taxonomy with
//!   recoverability semantics.
//! - **OHLCV normalizer** ([`ohlcv`]): canonical candles from row- or
//!   column-oriented payloads.
//! - **Request pipeline** ([`pipeline`]): orchestrates the above around an
//!   injected HTTP transport.
//! - **WebSocket adapter** ([`ws`]): long-lived managed connections with
//!   subscription restore and re-authentication across reconnects.
//!
//! ## Usage
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use connector::Connector;
//!
//! # async fn example(spec: Arc<types::ExchangeSpec>) -> connector::Result<()> {
//! let connector = Connector::builder().build();
//! let client = connector.client(spec);
//!
//! let mut params = BTreeMap::new();
//! params.insert("symbol".to_string(), "BTCUSDT".to_string());
//! let response = client.request("fetch_ticker", params, None).await?;
//! println!("{}", response.text());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod circuit_breaker;
pub mod classify;
pub mod config;
pub mod error;
pub mod ohlcv;
pub mod pipeline;
pub mod rate_limit;
pub mod retry;
pub mod signing;
pub mod telemetry;
pub mod transport;
pub mod ws;

pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitDecision, CircuitState, CircuitStatus,
    RequestOutcome,
};
pub use config::ConnectorOptions;
pub use error::{ConnectorError, ErrorVariant, Recoverability, Result, TransportErrorKind};
pub use ohlcv::{normalize, NormalizeError};
pub use pipeline::{Connector, ConnectorBuilder, ExchangeClient};
pub use rate_limit::{Admission, LimitKey, Pool, SlidingWindowLimiter};
pub use retry::RetryPolicy;
pub use signing::{SignContext, SignRequest, SignedRequest, Signer, SigningEngine};
pub use telemetry::{TelemetryEvent, TelemetryKind, TelemetrySink, TracingTelemetry};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportFailure};
pub use ws::{
    AdapterState, StopReason, Subscription, WsAdapter, WsAdapterConfig, WsEvent, WsHandler,
    WsStatus,
};

// Re-export the catalog data model for convenience.
pub use types::{Candle, Credentials, ExchangeSpec, HttpMethod};
