//! Declarative exchange specification records
//!
//! One record per exchange, loaded from the static catalog and read-only
//! afterwards. The connector core interprets these records; nothing in here
//! performs I/O.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::signing::SigningConfig;
use crate::ws::WsSpec;

/// Exchange identifier as used in catalog files and rate-limit keys.
pub type ExchangeId = String;

/// HTTP methods supported by endpoint descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET request; params are query-encoded
    Get,
    /// POST request; params are body-encoded
    Post,
    /// PUT request; params are body-encoded
    Put,
    /// DELETE request; params are query-encoded
    Delete,
}

impl HttpMethod {
    /// True for methods whose params travel in the query string.
    pub fn params_in_query(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Delete)
    }

    /// Canonical upper-case name, as used in signing payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base URLs for an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeUrls {
    /// Production REST base URL
    pub api: String,
    /// Sandbox REST base URL, when the venue offers one
    #[serde(default)]
    pub sandbox: Option<String>,
    /// WebSocket URL
    #[serde(default)]
    pub ws: Option<String>,
}

impl ExchangeUrls {
    /// REST base URL for the given environment, falling back to production
    /// when no sandbox URL is published.
    pub fn rest_base(&self, sandbox: bool) -> &str {
        if sandbox {
            self.sandbox.as_deref().unwrap_or(&self.api)
        } else {
            &self.api
        }
    }
}

/// One REST endpoint descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Unified endpoint name, e.g. `fetch_ticker`
    pub name: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Path relative to the base URL, e.g. `/api/v3/ticker/price`
    pub path: String,
    /// Whether the endpoint requires a signed request
    #[serde(default)]
    pub auth: bool,
    /// Declared parameter names (documentation; the core passes params through)
    #[serde(default)]
    pub params: Vec<String>,
    /// Rate-limit cost charged per call; defaults to 1
    #[serde(default)]
    pub cost: Option<f64>,
}

impl Endpoint {
    /// Rate-limit cost for one call to this endpoint.
    pub fn rate_limit_cost(&self) -> f64 {
        self.cost.unwrap_or(1.0)
    }
}

/// Sliding-window rate-limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Admissible cost within one window
    pub requests: f64,
    /// Window length in milliseconds
    pub period_ms: u64,
}

/// Structured error categories the classifier maps exchange codes onto.
///
/// Mirrors the connector's error taxonomy; catalog `error_codes` tables map
/// venue-specific code strings to one of these tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Request rejected by venue rate limiting
    RateLimited,
    /// Transport-level failure (timeout, refused, closed, DNS)
    NetworkError,
    /// Market suspended or not currently trading
    MarketClosed,
    /// Request rejected locally by an open circuit breaker
    CircuitOpen,
    /// Account balance insufficient for the operation
    InsufficientBalance,
    /// Credentials missing, malformed, or rejected
    InvalidCredentials,
    /// Request parameters rejected
    InvalidParameters,
    /// Order rejected as invalid
    InvalidOrder,
    /// Referenced order does not exist
    OrderNotFound,
    /// Access restricted (permissions, geography, bans)
    AccessRestricted,
    /// Operation not supported by the venue
    NotSupported,
    /// Uncategorized venue error, surfaced verbatim
    ExchangeError,
}

impl ErrorKind {
    /// Whether errors of this kind are expected to clear without operator
    /// intervention. `ExchangeError` is unknown and reported as `None`.
    pub fn recoverable(&self) -> Option<bool> {
        match self {
            ErrorKind::RateLimited
            | ErrorKind::NetworkError
            | ErrorKind::MarketClosed
            | ErrorKind::CircuitOpen => Some(true),
            ErrorKind::InsufficientBalance
            | ErrorKind::InvalidCredentials
            | ErrorKind::InvalidParameters
            | ErrorKind::InvalidOrder
            | ErrorKind::OrderNotFound
            | ErrorKind::AccessRestricted
            | ErrorKind::NotSupported => Some(false),
            ErrorKind::ExchangeError => None,
        }
    }
}

/// Complete declarative specification for one exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSpec {
    /// Exchange identifier, e.g. `binance`
    pub id: ExchangeId,
    /// Base URLs
    pub urls: ExchangeUrls,
    /// Authentication pattern and its parameters
    pub signing: SigningConfig,
    /// Unified REST endpoints
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    /// Sliding-window budget for the venue
    #[serde(default)]
    pub rate_limits: Option<RateLimitPolicy>,
    /// Venue error code -> structured error category
    #[serde(default)]
    pub error_codes: BTreeMap<String, ErrorKind>,
    /// Unified timeframe -> venue timeframe token
    #[serde(default)]
    pub timeframes: BTreeMap<String, String>,
    /// Symbol format descriptors; symbols themselves are opaque to the core
    #[serde(default)]
    pub symbol_formats: BTreeMap<String, String>,
    /// Per-exchange runtime knobs consumed by classifier hints and patterns
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
    /// WebSocket subscription and auth configuration
    #[serde(default)]
    pub ws: Option<WsSpec>,
}

impl ExchangeSpec {
    /// Look up an endpoint descriptor by unified name.
    pub fn endpoint(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// Map a venue error code string to its structured category.
    pub fn classify_code(&self, code: &str) -> Option<ErrorKind> {
        self.error_codes.get(code).copied()
    }

    /// String option lookup into the per-exchange knob table.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    /// Boolean option lookup into the per-exchange knob table.
    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(|v| v.as_bool())
    }
}
