//! WebSocket authentication patterns
//!
//! Each pattern builds a frame (or defers to a REST pre-auth) from the
//! credentials and the injected timestamp/nonce. The adapter sends the
//! frame and flips its auth flags; venues that hand out session tokens get
//! the TTL back as auth metadata.

use serde_json::{json, Map, Value};
use types::{Credentials, WsAuthConfig};

use crate::signing::hmac::{
    base64_encode, decode_secret, hmac_sha256, hmac_sha384, hmac_sha512,
};

/// What the adapter should do to authenticate.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthAction {
    /// Send this frame
    Frame(Value),
    /// Authenticate out-of-band via a REST endpoint, then signal the
    /// adapter with `mark_authenticated` (and `set_auth_token` for token
    /// patterns)
    RestPreAuth {
        /// Unified endpoint name that performs the pre-auth
        endpoint: String,
    },
    /// No dedicated frame; auth fields ride inside every subscribe
    PerSubscribe,
}

/// Session metadata returned by a pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AuthMeta {
    /// Wall-clock expiry of the authenticated session, when the pattern
    /// imposes one
    pub expires_at_ms: Option<i64>,
}

/// Build the authentication action for a pattern.
pub fn build_auth(
    cfg: &WsAuthConfig,
    creds: &Credentials,
    now_ms: i64,
    nonce: u64,
) -> (AuthAction, AuthMeta) {
    match cfg {
        WsAuthConfig::DirectHmacExpiry {
            op,
            ttl_ms,
            payload_prefix,
        } => {
            let expires = now_ms + *ttl_ms as i64;
            let payload = format!("{}{}", payload_prefix, expires);
            let signature = hex::encode(hmac_sha256(creds.secret.as_bytes(), payload.as_bytes()));
            (
                AuthAction::Frame(json!({
                    "op": op,
                    "args": [creds.api_key, expires, signature],
                })),
                AuthMeta {
                    expires_at_ms: Some(expires),
                },
            )
        }

        WsAuthConfig::IsoPassphrase { op } => {
            // Second-resolution epoch timestamp over the fixed verify path.
            let timestamp = (now_ms / 1000).to_string();
            let payload = format!("{}GET/users/self/verify", timestamp);
            let signature =
                base64_encode(&hmac_sha256(creds.secret.as_bytes(), payload.as_bytes()));
            (
                AuthAction::Frame(json!({
                    "op": op,
                    "args": [{
                        "apiKey": creds.api_key,
                        "passphrase": creds.passphrase.clone().unwrap_or_default(),
                        "timestamp": timestamp,
                        "sign": signature,
                    }],
                })),
                AuthMeta::default(),
            )
        }

        WsAuthConfig::JsonrpcLinebreak { method } => {
            let payload = format!("{}\n{}\n{}", now_ms, nonce, "");
            let signature = hex::encode(hmac_sha256(creds.secret.as_bytes(), payload.as_bytes()));
            (
                AuthAction::Frame(json!({
                    "jsonrpc": "2.0",
                    "method": method,
                    "params": {
                        "grant_type": "client_signature",
                        "client_id": creds.api_key,
                        "timestamp": now_ms,
                        "nonce": nonce.to_string(),
                        "data": "",
                        "signature": signature,
                    },
                })),
                AuthMeta::default(),
            )
        }

        WsAuthConfig::Sha384Nonce { event, prefix } => {
            let payload = format!("{}{}", prefix, nonce);
            let signature = hex::encode(hmac_sha384(creds.secret.as_bytes(), payload.as_bytes()));
            (
                AuthAction::Frame(json!({
                    "event": event,
                    "apiKey": creds.api_key,
                    "authNonce": nonce,
                    "authPayload": payload,
                    "authSig": signature,
                })),
                AuthMeta::default(),
            )
        }

        WsAuthConfig::Sha512Newline { path } => {
            let payload = format!("{}\n{}", path, nonce);
            let signature = base64_encode(&hmac_sha512(
                &decode_secret(&creds.secret),
                payload.as_bytes(),
            ));
            (
                AuthAction::Frame(json!({
                    "event": "auth",
                    "apiKey": creds.api_key,
                    "nonce": nonce.to_string(),
                    "signature": signature,
                })),
                AuthMeta::default(),
            )
        }

        WsAuthConfig::ListenKey { endpoint, .. } => (
            AuthAction::RestPreAuth {
                endpoint: endpoint.clone(),
            },
            AuthMeta::default(),
        ),

        WsAuthConfig::RestToken { endpoint, .. } => (
            AuthAction::RestPreAuth {
                endpoint: endpoint.clone(),
            },
            AuthMeta::default(),
        ),

        WsAuthConfig::InlineSubscribe => (AuthAction::PerSubscribe, AuthMeta::default()),

        WsAuthConfig::GenericHmac { op } => {
            let timestamp = now_ms.to_string();
            let signature =
                hex::encode(hmac_sha256(creds.secret.as_bytes(), timestamp.as_bytes()));
            (
                AuthAction::Frame(json!({
                    "op": op,
                    "api_key": creds.api_key,
                    "timestamp": timestamp,
                    "signature": signature,
                })),
                AuthMeta::default(),
            )
        }
    }
}

/// Auth fields merged into subscribe frames for the inline pattern.
pub fn inline_auth_fields(
    creds: &Credentials,
    now_ms: i64,
) -> Map<String, Value> {
    let timestamp = now_ms.to_string();
    let signature = hex::encode(hmac_sha256(creds.secret.as_bytes(), timestamp.as_bytes()));
    let mut fields = Map::new();
    fields.insert("api_key".to_string(), Value::String(creds.api_key.clone()));
    fields.insert("timestamp".to_string(), Value::String(timestamp));
    fields.insert("signature".to_string(), Value::String(signature));
    fields
}
