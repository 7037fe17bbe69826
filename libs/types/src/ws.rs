//! WebSocket specification records
//!
//! Subscription channel templates and the frame-level authentication pattern
//! selection for one exchange. Like the REST records, these are plain data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn default_auth_op() -> String {
    "auth".to_string()
}

fn default_login_op() -> String {
    "login".to_string()
}

fn default_auth_method() -> String {
    "public/auth".to_string()
}

fn default_auth_ttl_ms() -> u64 {
    10_000
}

fn default_expiry_payload_prefix() -> String {
    "GET/realtime".to_string()
}

fn default_sha384_prefix() -> String {
    "AUTH".to_string()
}

fn default_token_field() -> String {
    "token".to_string()
}

fn default_listen_key_param() -> String {
    "listenKey".to_string()
}

/// Frame-level authentication pattern for a WebSocket connection.
///
/// Each variant is a distinct strategy with the same shape: build a frame (or
/// perform a REST pre-auth), send, interpret the response, optionally return
/// a session TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "kebab-case")]
pub enum WsAuthConfig {
    /// HMAC over `prefix + expires_ms` sent in an auth op frame (Bybit family)
    DirectHmacExpiry {
        /// Frame operation name
        #[serde(default = "default_auth_op")]
        op: String,
        /// Signature validity window added to now
        #[serde(default = "default_auth_ttl_ms")]
        ttl_ms: u64,
        /// String prefix of the signed payload
        #[serde(default = "default_expiry_payload_prefix")]
        payload_prefix: String,
    },
    /// ISO-timestamp passphrase login frame (OKX family)
    IsoPassphrase {
        /// Frame operation name
        #[serde(default = "default_login_op")]
        op: String,
    },
    /// JSON-RPC auth with newline-joined client signature (Deribit family)
    JsonrpcLinebreak {
        /// JSON-RPC method name
        #[serde(default = "default_auth_method")]
        method: String,
    },
    /// SHA-384 HMAC over `prefix + nonce` (Bitfinex family)
    Sha384Nonce {
        /// Frame event name
        #[serde(default = "default_auth_op")]
        event: String,
        /// String prefix of the signed payload
        #[serde(default = "default_sha384_prefix")]
        prefix: String,
    },
    /// SHA-512 HMAC over `path \n nonce`, base64-decoded secret (Kraken family)
    Sha512Newline {
        /// Signed path component
        path: String,
    },
    /// REST pre-auth obtaining a listen key; no WS auth frame is sent
    ListenKey {
        /// Unified endpoint name that issues the listen key
        endpoint: String,
        /// Query parameter carrying the key on the WS URL
        #[serde(default = "default_listen_key_param")]
        param: String,
    },
    /// REST pre-auth obtaining a token carried inside subscribe frames
    RestToken {
        /// Unified endpoint name that issues the token
        endpoint: String,
        /// Field name injected into subscribe frames
        #[serde(default = "default_token_field")]
        token_field: String,
    },
    /// Auth fields are merged into every subscribe frame; no dedicated frame
    InlineSubscribe,
    /// Generic HMAC auth frame: key, timestamp, hex SHA-256 signature
    GenericHmac {
        /// Frame operation name
        #[serde(default = "default_auth_op")]
        op: String,
    },
}

/// One URL substring pattern mapping to an account-type tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlPattern {
    /// Substring matched against the connection URL; `None` acts as default
    #[serde(default)]
    pub pattern: Option<String>,
    /// Account-type tag selected when the pattern matches
    pub account_type: String,
}

/// Channel template routed by connection URL.
///
/// Venues that serve different topic namespaces on different URLs
/// (spot/unified/usdc/derivatives) declare substring patterns and a
/// per-account-type topic table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedChannel {
    /// Ordered URL patterns; first match wins, `None` pattern is the default
    pub url_patterns: Vec<UrlPattern>,
    /// Account-type tag -> topic template
    pub topics: BTreeMap<String, String>,
}

/// Subscription channel template: either a plain topic string or URL-routed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelTemplate {
    /// Fixed topic template
    Plain(String),
    /// URL-routed topic table
    Routed(RoutedChannel),
}

/// WebSocket configuration for one exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsSpec {
    /// WebSocket URL override; falls back to `urls.ws`
    #[serde(default)]
    pub url: Option<String>,
    /// Frame-level auth pattern, when the venue supports private streams
    #[serde(default)]
    pub auth: Option<WsAuthConfig>,
    /// Channel name -> topic template
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelTemplate>,
}
