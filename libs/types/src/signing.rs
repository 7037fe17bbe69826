//! Signing pattern selection and pattern-specific parameters
//!
//! A closed, tagged sum over the authentication strategies the connector
//! implements. Each exchange's catalog entry names exactly one pattern; the
//! per-pattern records carry venue-specific header and parameter names with
//! generic defaults.

use serde::{Deserialize, Serialize};

/// Output encoding for an HMAC signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignatureEncoding {
    /// Lowercase hexadecimal
    #[default]
    Hex,
    /// Standard base64 with padding
    Base64,
}

fn default_key_header() -> String {
    "X-API-KEY".to_string()
}

fn default_sign_header() -> String {
    "X-API-SIGN".to_string()
}

fn default_timestamp_header() -> String {
    "X-API-TIMESTAMP".to_string()
}

fn default_passphrase_header() -> String {
    "X-API-PASSPHRASE".to_string()
}

fn default_signature_param() -> String {
    "signature".to_string()
}

fn default_timestamp_param() -> String {
    "timestamp".to_string()
}

fn default_api_key_version() -> String {
    "2".to_string()
}

fn default_payload_prefix() -> String {
    "/api".to_string()
}

/// Query-string signing (Binance family): the signature rides as a query
/// parameter over the lexicographically ordered, URL-encoded params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySigning {
    /// Header carrying the API key
    #[serde(default = "default_key_header")]
    pub key_header: String,
    /// Query parameter receiving the signature
    #[serde(default = "default_signature_param")]
    pub signature_param: String,
    /// Query parameter receiving the millisecond timestamp
    #[serde(default = "default_timestamp_param")]
    pub timestamp_param: String,
    /// Query parameter for the receive window; only sent when configured
    #[serde(default)]
    pub recv_window_param: Option<String>,
    /// Query parameter for the broker marker; only sent when configured
    #[serde(default)]
    pub broker_id_param: Option<String>,
    /// Signature encoding
    #[serde(default)]
    pub encoding: SignatureEncoding,
}

impl Default for QuerySigning {
    fn default() -> Self {
        Self {
            key_header: default_key_header(),
            signature_param: default_signature_param(),
            timestamp_param: default_timestamp_param(),
            recv_window_param: None,
            broker_id_param: None,
            encoding: SignatureEncoding::Hex,
        }
    }
}

/// Header signing (Bybit family): payload is
/// `timestamp ‖ apiKey ‖ recvWindow ‖ (query|body)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderSigning {
    /// Header carrying the API key
    #[serde(default = "default_key_header")]
    pub key_header: String,
    /// Header carrying the signature
    #[serde(default = "default_sign_header")]
    pub sign_header: String,
    /// Header carrying the millisecond timestamp
    #[serde(default = "default_timestamp_header")]
    pub timestamp_header: String,
    /// Header carrying the receive window, when the venue expects one
    #[serde(default)]
    pub recv_window_header: Option<String>,
    /// Signature encoding
    #[serde(default)]
    pub encoding: SignatureEncoding,
}

impl Default for HeaderSigning {
    fn default() -> Self {
        Self {
            key_header: default_key_header(),
            sign_header: default_sign_header(),
            timestamp_header: default_timestamp_header(),
            recv_window_header: None,
            encoding: SignatureEncoding::Hex,
        }
    }
}

/// ISO-timestamp passphrase signing (OKX family): payload is
/// `iso_ts ‖ METHOD ‖ path ‖ body`, base64 signature, passphrase sent plain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassphraseSigning {
    /// Header carrying the API key
    #[serde(default = "default_key_header")]
    pub key_header: String,
    /// Header carrying the signature
    #[serde(default = "default_sign_header")]
    pub sign_header: String,
    /// Header carrying the ISO-8601 timestamp
    #[serde(default = "default_timestamp_header")]
    pub timestamp_header: String,
    /// Header carrying the passphrase
    #[serde(default = "default_passphrase_header")]
    pub passphrase_header: String,
}

impl Default for PassphraseSigning {
    fn default() -> Self {
        Self {
            key_header: default_key_header(),
            sign_header: default_sign_header(),
            timestamp_header: default_timestamp_header(),
            passphrase_header: default_passphrase_header(),
        }
    }
}

/// Millisecond-timestamp passphrase signing (KuCoin family): same payload as
/// [`PassphraseSigning`] but with a millisecond timestamp, and the passphrase
/// itself HMAC-signed when `api_key_version` is `2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPassphraseSigning {
    /// Header carrying the API key
    #[serde(default = "default_key_header")]
    pub key_header: String,
    /// Header carrying the signature
    #[serde(default = "default_sign_header")]
    pub sign_header: String,
    /// Header carrying the millisecond timestamp
    #[serde(default = "default_timestamp_header")]
    pub timestamp_header: String,
    /// Header carrying the (possibly signed) passphrase
    #[serde(default = "default_passphrase_header")]
    pub passphrase_header: String,
    /// Header announcing the key version, when the venue expects one
    #[serde(default)]
    pub version_header: Option<String>,
    /// Key version; `2` switches the passphrase to its signed form
    #[serde(default = "default_api_key_version")]
    pub api_key_version: String,
}

impl Default for SignedPassphraseSigning {
    fn default() -> Self {
        Self {
            key_header: default_key_header(),
            sign_header: default_sign_header(),
            timestamp_header: default_timestamp_header(),
            passphrase_header: default_passphrase_header(),
            version_header: None,
            api_key_version: default_api_key_version(),
        }
    }
}

/// Nonce body signing (Kraken family): a monotonic microsecond nonce is
/// injected into the body; payload is `path ‖ sha256(nonce ‖ body)` signed
/// with the base64-decoded secret under HMAC-SHA512.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceSigning {
    /// Header carrying the API key
    #[serde(default = "default_key_header")]
    pub key_header: String,
    /// Header carrying the signature
    #[serde(default = "default_sign_header")]
    pub sign_header: String,
}

impl Default for NonceSigning {
    fn default() -> Self {
        Self {
            key_header: default_key_header(),
            sign_header: default_sign_header(),
        }
    }
}

/// Newline-joined signing (Gate family): payload is
/// `METHOD\npath\nquery\nsha512hex(body)\nts_seconds`, hex signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSigning {
    /// Header carrying the API key
    #[serde(default = "default_key_header")]
    pub key_header: String,
    /// Header carrying the signature
    #[serde(default = "default_sign_header")]
    pub sign_header: String,
    /// Header carrying the second-resolution timestamp
    #[serde(default = "default_timestamp_header")]
    pub timestamp_header: String,
}

impl Default for GateSigning {
    fn default() -> Self {
        Self {
            key_header: default_key_header(),
            sign_header: default_sign_header(),
            timestamp_header: default_timestamp_header(),
        }
    }
}

/// Which SHA-384 payload construction a venue uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PayloadVariant {
    /// `prefix + path + nonce + body`, nonce in its own header
    #[default]
    Bitfinex,
    /// `base64(JSON{request, nonce, ...params})`, payload in its own header
    Gemini,
}

/// SHA-384 payload signing (Bitfinex/Gemini family).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadSigning {
    /// Payload construction variant
    #[serde(default)]
    pub variant: PayloadVariant,
    /// Path prefix prepended in the Bitfinex construction
    #[serde(default = "default_payload_prefix")]
    pub prefix: String,
    /// Header carrying the API key
    #[serde(default = "default_key_header")]
    pub key_header: String,
    /// Header carrying the signature
    #[serde(default = "default_sign_header")]
    pub sign_header: String,
    /// Header carrying the nonce (Bitfinex variant)
    #[serde(default)]
    pub nonce_header: Option<String>,
    /// Header carrying the base64 payload (Gemini variant)
    #[serde(default)]
    pub payload_header: Option<String>,
}

impl Default for PayloadSigning {
    fn default() -> Self {
        Self {
            variant: PayloadVariant::Bitfinex,
            prefix: default_payload_prefix(),
            key_header: default_key_header(),
            sign_header: default_sign_header(),
            nonce_header: None,
            payload_header: None,
        }
    }
}

/// Caller-supplied signing strategy reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomSigning {
    /// Name under which the strategy was registered with the connector
    pub module: String,
}

/// Authentication pattern for one exchange.
///
/// Closed sum; the signing engine dispatches on the tag. The `custom`
/// variant is an indirection to a strategy registered at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "kebab-case")]
pub enum SigningConfig {
    /// Query-string HMAC-SHA256 (Binance family)
    QueryHmacSha256(QuerySigning),
    /// Header HMAC-SHA256 (Bybit family)
    HeadersHmacSha256(HeaderSigning),
    /// ISO-timestamp passphrase HMAC-SHA256 (OKX family)
    IsoPassphraseHmacSha256(PassphraseSigning),
    /// Signed-passphrase HMAC-SHA256 (KuCoin family)
    SignedPassphraseHmacSha256(SignedPassphraseSigning),
    /// Nonce body HMAC-SHA512 (Kraken family)
    NonceHmacSha512(NonceSigning),
    /// Newline-joined HMAC-SHA512 (Gate family)
    GateHmacSha512(GateSigning),
    /// SHA-384 payload signing (Bitfinex/Gemini family)
    PayloadHmacSha384(PayloadSigning),
    /// `Authorization: deri-hmac-sha256` signing (Deribit)
    DeribitHmacSha256,
    /// Caller-supplied strategy
    Custom(CustomSigning),
}

impl SigningConfig {
    /// Pattern tag as written in catalog files.
    pub fn pattern_name(&self) -> &'static str {
        match self {
            SigningConfig::QueryHmacSha256(_) => "query-hmac-sha256",
            SigningConfig::HeadersHmacSha256(_) => "headers-hmac-sha256",
            SigningConfig::IsoPassphraseHmacSha256(_) => "iso-passphrase-hmac-sha256",
            SigningConfig::SignedPassphraseHmacSha256(_) => "signed-passphrase-hmac-sha256",
            SigningConfig::NonceHmacSha512(_) => "nonce-hmac-sha512",
            SigningConfig::GateHmacSha512(_) => "gate-hmac-sha512",
            SigningConfig::PayloadHmacSha384(_) => "payload-hmac-sha384",
            SigningConfig::DeribitHmacSha256 => "deribit-hmac-sha256",
            SigningConfig::Custom(_) => "custom",
        }
    }
}
