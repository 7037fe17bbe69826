//! Request signing engine
//!
//! A family of HMAC-based authentication strategies selected per exchange by
//! the catalog's signing pattern tag. Signing is pure: given a timestamp and
//! nonce, the same request always produces the same signed artifact. The
//! engine performs no I/O and never fails on credential content; the only
//! error path is malformed pattern configuration.

pub mod clock;
pub(crate) mod hmac;
mod patterns;
mod request;

use std::collections::HashMap;
use std::sync::Arc;

use types::{Credentials, SigningConfig};

use crate::error::{ConnectorError, Result};

pub use clock::{Clock, MonotonicNonce, NonceSource, SystemClock};
pub use request::{SignContext, SignRequest, SignedRequest};

/// A caller-supplied signing strategy, used by the `custom` pattern.
///
/// Implementations share the built-in patterns' contract: pure, no I/O,
/// secrets never copied into the output.
pub trait Signer: Send + Sync {
    /// Produce a signed request.
    fn sign(
        &self,
        request: &SignRequest,
        credentials: &Credentials,
        ctx: &SignContext,
    ) -> Result<SignedRequest>;
}

/// Sign a request with explicit context. Deterministic; the engine's
/// entry point wraps this with live clock and nonce sources.
pub fn sign_with_context(
    exchange: &str,
    request: &SignRequest,
    credentials: &Credentials,
    config: &SigningConfig,
    ctx: &SignContext,
    custom: &HashMap<String, Arc<dyn Signer>>,
) -> Result<SignedRequest> {
    match config {
        SigningConfig::QueryHmacSha256(cfg) => {
            patterns::sign_query_sha256(request, credentials, cfg, ctx)
        }
        SigningConfig::HeadersHmacSha256(cfg) => {
            patterns::sign_headers_sha256(request, credentials, cfg, ctx)
        }
        SigningConfig::IsoPassphraseHmacSha256(cfg) => {
            patterns::sign_iso_passphrase(request, credentials, cfg, ctx)
        }
        SigningConfig::SignedPassphraseHmacSha256(cfg) => {
            patterns::sign_signed_passphrase(request, credentials, cfg, ctx)
        }
        SigningConfig::NonceHmacSha512(cfg) => {
            patterns::sign_nonce_sha512(request, credentials, cfg, ctx)
        }
        SigningConfig::GateHmacSha512(cfg) => {
            patterns::sign_gate_sha512(request, credentials, cfg, ctx)
        }
        SigningConfig::PayloadHmacSha384(cfg) => {
            patterns::sign_payload_sha384(request, credentials, cfg, ctx)
        }
        SigningConfig::DeribitHmacSha256 => {
            patterns::sign_deribit_sha256(request, credentials, ctx)
        }
        SigningConfig::Custom(cfg) => match custom.get(&cfg.module) {
            Some(signer) => signer.sign(request, credentials, ctx),
            None => Err(ConnectorError::invalid_parameters(
                exchange,
                format!("custom signing module '{}' is not registered", cfg.module),
            )),
        },
    }
}

/// Signing engine: pattern dispatch plus live timestamp and nonce sources
/// and the registry of caller-supplied strategies.
#[derive(Clone)]
pub struct SigningEngine {
    clock: Arc<dyn Clock>,
    nonce: Arc<dyn NonceSource>,
    custom: HashMap<String, Arc<dyn Signer>>,
}

impl Default for SigningEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningEngine {
    /// Engine with the system clock and a monotonic microsecond nonce.
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            nonce: Arc::new(MonotonicNonce::new()),
            custom: HashMap::new(),
        }
    }

    /// Replace the clock, for deterministic signing in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the nonce source.
    pub fn with_nonce_source(mut self, nonce: Arc<dyn NonceSource>) -> Self {
        self.nonce = nonce;
        self
    }

    /// Register a caller-supplied strategy for the `custom` pattern.
    pub fn register(&mut self, module: impl Into<String>, signer: Arc<dyn Signer>) {
        self.custom.insert(module.into(), signer);
    }

    /// Build a signing context from the live sources.
    pub fn context(&self, recv_window_ms: Option<u64>, broker_id: Option<String>) -> SignContext {
        SignContext {
            timestamp_ms: self.clock.now_ms(),
            nonce: self.nonce.next(),
            recv_window_ms,
            broker_id,
        }
    }

    /// Sign a request with a fresh context.
    pub fn sign(
        &self,
        exchange: &str,
        request: &SignRequest,
        credentials: &Credentials,
        config: &SigningConfig,
        recv_window_ms: Option<u64>,
        broker_id: Option<String>,
    ) -> Result<SignedRequest> {
        let ctx = self.context(recv_window_ms, broker_id);
        sign_with_context(exchange, request, credentials, config, &ctx, &self.custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::signing::CustomSigning;
    use types::HttpMethod;

    struct EchoSigner;

    impl Signer for EchoSigner {
        fn sign(
            &self,
            request: &SignRequest,
            credentials: &Credentials,
            _ctx: &SignContext,
        ) -> Result<SignedRequest> {
            Ok(SignedRequest {
                method: request.method,
                url: request.path_with_query(),
                headers: vec![("X-CUSTOM-KEY".to_string(), credentials.api_key.clone())],
                body: None,
            })
        }
    }

    #[test]
    fn custom_pattern_dispatches_to_registered_signer() {
        let mut engine = SigningEngine::new();
        engine.register("echo", Arc::new(EchoSigner));

        let config = SigningConfig::Custom(CustomSigning {
            module: "echo".into(),
        });
        let req = SignRequest::new(HttpMethod::Get, "/ping");
        let signed = engine
            .sign("testex", &req, &Credentials::new("K", "S"), &config, None, None)
            .unwrap();
        assert_eq!(signed.header("X-CUSTOM-KEY"), Some("K"));
    }

    #[test]
    fn unregistered_custom_module_is_invalid_parameters() {
        let engine = SigningEngine::new();
        let config = SigningConfig::Custom(CustomSigning {
            module: "missing".into(),
        });
        let req = SignRequest::new(HttpMethod::Get, "/ping");
        let err = engine
            .sign("testex", &req, &Credentials::new("K", "S"), &config, None, None)
            .unwrap_err();
        assert_eq!(err.kind(), types::ErrorKind::InvalidParameters);
    }

    #[test]
    fn engine_nonces_increase_across_signs() {
        let engine = SigningEngine::new();
        let a = engine.context(None, None);
        let b = engine.context(None, None);
        assert!(b.nonce > a.nonce);
    }
}
