//! Error taxonomy for connector operations
//!
//! Errors are values: every boundary of the core returns `Result` and the
//! pipeline retries only what the taxonomy marks recoverable. Each error
//! carries the exchange id and, when available, the endpoint name and the
//! offending symbol, plus deterministic human-readable hints.

use thiserror::Error;
use types::ErrorKind;

/// Result type alias for connector operations
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Transport-level failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Deadline elapsed before a response arrived
    Timeout,
    /// TCP connection refused
    ConnectionRefused,
    /// Connection closed mid-exchange
    ConnectionClosed,
    /// Name resolution failed
    Dns,
    /// Any other transport-class failure
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::ConnectionRefused => write!(f, "connection refused"),
            TransportErrorKind::ConnectionClosed => write!(f, "connection closed"),
            TransportErrorKind::Dns => write!(f, "dns failure"),
            TransportErrorKind::Other => write!(f, "transport failure"),
        }
    }
}

/// Whether an error is expected to clear without operator intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recoverability {
    /// Retry is reasonable
    Recoverable,
    /// Retry will not help
    Fatal,
    /// Venue-specific; the caller inspects code and message
    Unknown,
}

/// The structured error variant, matching the public taxonomy.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorVariant {
    /// Venue rejected the request for rate-limit reasons
    RateLimited {
        /// Advertised wait before retrying, when the venue sent one
        retry_after_ms: Option<u64>,
    },
    /// Transport-level failure
    NetworkError {
        /// Failure class
        kind: TransportErrorKind,
        /// Human-readable detail
        detail: String,
    },
    /// Market suspended or outside trading hours
    MarketClosed,
    /// Rejected locally by an open circuit breaker
    CircuitOpen,
    /// Balance insufficient for the operation
    InsufficientBalance,
    /// Credentials missing, malformed, or rejected
    InvalidCredentials,
    /// Request parameters rejected
    InvalidParameters {
        /// What was malformed
        detail: String,
    },
    /// Order rejected as invalid
    InvalidOrder,
    /// Referenced order does not exist
    OrderNotFound,
    /// Permissions, geography, or account restrictions
    AccessRestricted,
    /// Venue does not support the operation
    NotSupported {
        /// What is unsupported
        detail: String,
    },
    /// Uncategorized venue error, surfaced verbatim
    ExchangeError {
        /// Venue error code, when present
        code: Option<String>,
        /// Venue error message
        message: String,
        /// HTTP status, when the error came off a REST response
        http_status: Option<u16>,
    },
}

impl ErrorVariant {
    /// Structured category tag for this variant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorVariant::RateLimited { .. } => ErrorKind::RateLimited,
            ErrorVariant::NetworkError { .. } => ErrorKind::NetworkError,
            ErrorVariant::MarketClosed => ErrorKind::MarketClosed,
            ErrorVariant::CircuitOpen => ErrorKind::CircuitOpen,
            ErrorVariant::InsufficientBalance => ErrorKind::InsufficientBalance,
            ErrorVariant::InvalidCredentials => ErrorKind::InvalidCredentials,
            ErrorVariant::InvalidParameters { .. } => ErrorKind::InvalidParameters,
            ErrorVariant::InvalidOrder => ErrorKind::InvalidOrder,
            ErrorVariant::OrderNotFound => ErrorKind::OrderNotFound,
            ErrorVariant::AccessRestricted => ErrorKind::AccessRestricted,
            ErrorVariant::NotSupported { .. } => ErrorKind::NotSupported,
            ErrorVariant::ExchangeError { .. } => ErrorKind::ExchangeError,
        }
    }

    /// Recoverability verdict for this variant.
    pub fn recoverability(&self) -> Recoverability {
        match self.kind().recoverable() {
            Some(true) => Recoverability::Recoverable,
            Some(false) => Recoverability::Fatal,
            None => Recoverability::Unknown,
        }
    }
}

impl std::fmt::Display for ErrorVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorVariant::RateLimited { retry_after_ms } => match retry_after_ms {
                Some(ms) => write!(f, "rate limited, retry after {}ms", ms),
                None => write!(f, "rate limited"),
            },
            ErrorVariant::NetworkError { kind, detail } => {
                write!(f, "network error ({}): {}", kind, detail)
            }
            ErrorVariant::MarketClosed => write!(f, "market closed"),
            ErrorVariant::CircuitOpen => write!(f, "circuit breaker open"),
            ErrorVariant::InsufficientBalance => write!(f, "insufficient balance"),
            ErrorVariant::InvalidCredentials => write!(f, "invalid credentials"),
            ErrorVariant::InvalidParameters { detail } => {
                write!(f, "invalid parameters: {}", detail)
            }
            ErrorVariant::InvalidOrder => write!(f, "invalid order"),
            ErrorVariant::OrderNotFound => write!(f, "order not found"),
            ErrorVariant::AccessRestricted => write!(f, "access restricted"),
            ErrorVariant::NotSupported { detail } => write!(f, "not supported: {}", detail),
            ErrorVariant::ExchangeError {
                code,
                message,
                http_status,
            } => {
                write!(f, "exchange error")?;
                if let Some(status) = http_status {
                    write!(f, " (http {})", status)?;
                }
                if let Some(code) = code {
                    write!(f, " [{}]", code)?;
                }
                write!(f, ": {}", message)
            }
        }
    }
}

/// Structured connector error.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{exchange}: {variant}")]
pub struct ConnectorError {
    /// Exchange the failing call targeted
    pub exchange: String,
    /// Structured error variant
    pub variant: ErrorVariant,
    /// Unified endpoint name, when the call went through the catalog
    pub endpoint: Option<String>,
    /// Offending symbol, when one was involved
    pub symbol: Option<String>,
    /// Deterministic human-readable hints
    pub hints: Vec<String>,
}

impl ConnectorError {
    /// Build an error for an exchange.
    pub fn new(exchange: impl Into<String>, variant: ErrorVariant) -> Self {
        Self {
            exchange: exchange.into(),
            variant,
            endpoint: None,
            symbol: None,
            hints: Vec::new(),
        }
    }

    /// Attach the unified endpoint name.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Attach the offending symbol.
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Replace the hint list. Caller-supplied hints override, they are not
    /// merged with the classifier's.
    pub fn with_hints(mut self, hints: Vec<String>) -> Self {
        self.hints = hints;
        self
    }

    /// Structured category tag.
    pub fn kind(&self) -> ErrorKind {
        self.variant.kind()
    }

    /// Recoverability verdict.
    pub fn recoverability(&self) -> Recoverability {
        self.variant.recoverability()
    }

    /// True for variants a retry policy may act on. `Unknown` counts as
    /// not recoverable; the caller decides for those.
    pub fn is_recoverable(&self) -> bool {
        self.recoverability() == Recoverability::Recoverable
    }

    /// Advertised retry delay for rate-limit errors.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self.variant {
            ErrorVariant::RateLimited { retry_after_ms } => retry_after_ms,
            _ => None,
        }
    }

    /// Shorthand for an invalid-parameters error.
    pub fn invalid_parameters(exchange: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(
            exchange,
            ErrorVariant::InvalidParameters {
                detail: detail.into(),
            },
        )
    }

    /// Shorthand for a not-supported error.
    pub fn not_supported(exchange: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(
            exchange,
            ErrorVariant::NotSupported {
                detail: detail.into(),
            },
        )
    }
}
