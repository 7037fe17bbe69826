//! # Lynx Types - Exchange Specification Data Model
//!
//! Declarative per-exchange specification records consumed by the connector
//! core, plus the shared market-data primitives (canonical candles) and
//! credential handling.
//!
//! The exchange catalog is plain data: URLs, endpoint descriptors, signing
//! pattern selection, rate-limit policy, error-code mappings, and WebSocket
//! channel templates. One connector implementation interprets all of it; no
//! per-exchange code is generated or required.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod candle;
pub mod credentials;
pub mod exchange;
pub mod signing;
pub mod ws;

pub use candle::Candle;
pub use credentials::Credentials;
pub use exchange::{
    Endpoint, ErrorKind, ExchangeId, ExchangeSpec, ExchangeUrls, HttpMethod, RateLimitPolicy,
};
pub use signing::{SignatureEncoding, SigningConfig};
pub use ws::{ChannelTemplate, RoutedChannel, WsAuthConfig, WsSpec};
