//! API credentials with redacted debug output

use sha2::{Digest, Sha256};

/// API credentials for a single exchange account.
///
/// Immutable once constructed. The secret and passphrase never appear in
/// `Debug` output and must never be logged; only derived signatures and the
/// API key itself leave the signing engine.
#[derive(Clone)]
pub struct Credentials {
    /// Public API key identifier
    pub api_key: String,
    /// Signing secret
    pub secret: String,
    /// Optional API passphrase (OKX/KuCoin-style venues)
    pub passphrase: Option<String>,
    /// Route requests to the venue's sandbox environment
    pub sandbox: bool,
}

impl Credentials {
    /// Create credentials from a key/secret pair.
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            passphrase: None,
            sandbox: false,
        }
    }

    /// Attach a passphrase.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Target the sandbox environment.
    pub fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Stable identifier derived from the API key, safe to use as a
    /// rate-limit pool key or in log output.
    pub fn key_id(&self) -> String {
        let digest = Sha256::digest(self.api_key.as_bytes());
        hex::encode(&digest[..8])
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .field(
                "passphrase",
                &self.passphrase.as_ref().map(|_| "<redacted>"),
            )
            .field("sandbox", &self.sandbox)
            .finish()
    }
}
