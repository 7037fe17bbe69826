//! The signing pattern implementations
//!
//! Each pattern shares the same contract: a pure function of the normalized
//! request, the credentials, the pattern parameters, and the injected
//! timestamp/nonce context. Secrets never appear in the output; only derived
//! signatures and the API key do.

use std::collections::BTreeMap;

use types::signing::{
    GateSigning, HeaderSigning, NonceSigning, PassphraseSigning, PayloadSigning, PayloadVariant,
    QuerySigning, SignedPassphraseSigning,
};
use types::Credentials;

use super::hmac::{
    base64_encode, decode_secret, encode_signature, hmac_sha256, hmac_sha384, hmac_sha512,
    sha256_digest, sha512_hex,
};
use super::request::{encode_pairs, SignContext, SignRequest, SignedRequest};
use crate::error::Result;

fn body_string(req: &SignRequest) -> String {
    String::from_utf8_lossy(&req.effective_body()).into_owned()
}

fn carried_body(req: &SignRequest) -> Option<Vec<u8>> {
    let body = req.effective_body();
    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}

/// Query-string HMAC-SHA256 (Binance family).
///
/// All params ride in the query, lexicographically ordered, with the
/// timestamp (and optional receive window and broker marker) appended as
/// ordinary params. The signature covers the query string, concatenated
/// with the explicit body when one is present, and is itself appended as
/// the final query parameter.
pub(super) fn sign_query_sha256(
    req: &SignRequest,
    creds: &Credentials,
    cfg: &QuerySigning,
    ctx: &SignContext,
) -> Result<SignedRequest> {
    let mut params: BTreeMap<String, String> = req.params.clone();
    params.insert(cfg.timestamp_param.clone(), ctx.timestamp_ms.to_string());
    if let (Some(name), Some(window)) = (&cfg.recv_window_param, ctx.recv_window_ms) {
        params.insert(name.clone(), window.to_string());
    }
    if let (Some(name), Some(broker)) = (&cfg.broker_id_param, &ctx.broker_id) {
        params.insert(name.clone(), broker.clone());
    }

    let query = encode_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let mut signable = query.clone().into_bytes();
    if let Some(body) = &req.body {
        signable.extend_from_slice(body);
    }

    let signature = encode_signature(
        &hmac_sha256(creds.secret.as_bytes(), &signable),
        cfg.encoding,
    );

    Ok(SignedRequest {
        method: req.method,
        url: format!(
            "{}?{}&{}",
            req.path,
            query,
            encode_pairs([(cfg.signature_param.as_str(), signature.as_str())].into_iter())
        ),
        headers: vec![(cfg.key_header.clone(), creds.api_key.clone())],
        body: req.body.clone(),
    })
}

/// Header HMAC-SHA256 (Bybit family).
///
/// Payload is `timestamp ‖ apiKey ‖ recvWindow ‖ (query|body)`; the
/// signature and its inputs travel in headers.
pub(super) fn sign_headers_sha256(
    req: &SignRequest,
    creds: &Credentials,
    cfg: &HeaderSigning,
    ctx: &SignContext,
) -> Result<SignedRequest> {
    let timestamp = ctx.timestamp_ms.to_string();
    let recv_window = ctx
        .recv_window_ms
        .map(|w| w.to_string())
        .unwrap_or_default();
    let tail = if req.method.params_in_query() {
        req.encoded_query()
    } else {
        body_string(req)
    };

    let payload = format!("{}{}{}{}", timestamp, creds.api_key, recv_window, tail);
    let signature = encode_signature(
        &hmac_sha256(creds.secret.as_bytes(), payload.as_bytes()),
        cfg.encoding,
    );

    let mut headers = vec![
        (cfg.key_header.clone(), creds.api_key.clone()),
        (cfg.timestamp_header.clone(), timestamp),
        (cfg.sign_header.clone(), signature),
    ];
    if let (Some(name), false) = (&cfg.recv_window_header, recv_window.is_empty()) {
        headers.push((name.clone(), recv_window));
    }

    Ok(SignedRequest {
        method: req.method,
        url: req.path_with_query(),
        headers,
        body: carried_body(req),
    })
}

/// ISO-timestamp passphrase HMAC-SHA256 (OKX family).
///
/// Payload is `iso_ts ‖ METHOD ‖ path ‖ body`; signature is base64 and the
/// passphrase is sent in the clear.
pub(super) fn sign_iso_passphrase(
    req: &SignRequest,
    creds: &Credentials,
    cfg: &PassphraseSigning,
    ctx: &SignContext,
) -> Result<SignedRequest> {
    let timestamp = super::clock::iso_from_ms(ctx.timestamp_ms);
    let request_path = req.path_with_query();
    let payload = format!(
        "{}{}{}{}",
        timestamp,
        req.method.as_str(),
        request_path,
        body_string(req)
    );
    let signature = base64_encode(&hmac_sha256(creds.secret.as_bytes(), payload.as_bytes()));

    Ok(SignedRequest {
        method: req.method,
        url: request_path,
        headers: vec![
            (cfg.key_header.clone(), creds.api_key.clone()),
            (cfg.sign_header.clone(), signature),
            (cfg.timestamp_header.clone(), timestamp),
            (
                cfg.passphrase_header.clone(),
                creds.passphrase.clone().unwrap_or_default(),
            ),
        ],
        body: carried_body(req),
    })
}

/// Millisecond-timestamp passphrase HMAC-SHA256 (KuCoin family).
///
/// Same payload as the ISO pattern with a millisecond timestamp; under key
/// version 2 the passphrase header carries `base64(hmac(passphrase))`.
pub(super) fn sign_signed_passphrase(
    req: &SignRequest,
    creds: &Credentials,
    cfg: &SignedPassphraseSigning,
    ctx: &SignContext,
) -> Result<SignedRequest> {
    let timestamp = ctx.timestamp_ms.to_string();
    let request_path = req.path_with_query();
    let payload = format!(
        "{}{}{}{}",
        timestamp,
        req.method.as_str(),
        request_path,
        body_string(req)
    );
    let signature = base64_encode(&hmac_sha256(creds.secret.as_bytes(), payload.as_bytes()));

    let plain = creds.passphrase.clone().unwrap_or_default();
    let passphrase = if cfg.api_key_version == "2" {
        base64_encode(&hmac_sha256(creds.secret.as_bytes(), plain.as_bytes()))
    } else {
        plain
    };

    let mut headers = vec![
        (cfg.key_header.clone(), creds.api_key.clone()),
        (cfg.sign_header.clone(), signature),
        (cfg.timestamp_header.clone(), timestamp),
        (cfg.passphrase_header.clone(), passphrase),
    ];
    if let Some(name) = &cfg.version_header {
        headers.push((name.clone(), cfg.api_key_version.clone()));
    }

    Ok(SignedRequest {
        method: req.method,
        url: request_path,
        headers,
        body: carried_body(req),
    })
}

/// Nonce body HMAC-SHA512 (Kraken family).
///
/// The monotonic microsecond nonce is injected into a form-encoded body;
/// the payload is `path ‖ sha256(nonce ‖ body)` signed with the
/// base64-decoded secret.
pub(super) fn sign_nonce_sha512(
    req: &SignRequest,
    creds: &Credentials,
    cfg: &NonceSigning,
    ctx: &SignContext,
) -> Result<SignedRequest> {
    let nonce = ctx.nonce.to_string();

    let mut fields: BTreeMap<String, String> = req.params.clone();
    fields.insert("nonce".to_string(), nonce.clone());
    let body = encode_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    let mut inner = nonce.into_bytes();
    inner.extend_from_slice(body.as_bytes());

    let mut signable = req.path.clone().into_bytes();
    signable.extend_from_slice(&sha256_digest(&inner));

    let signature = base64_encode(&hmac_sha512(&decode_secret(&creds.secret), &signable));

    Ok(SignedRequest {
        method: req.method,
        url: req.path.clone(),
        headers: vec![
            (cfg.key_header.clone(), creds.api_key.clone()),
            (cfg.sign_header.clone(), signature),
            (
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            ),
        ],
        body: Some(body.into_bytes()),
    })
}

/// Newline-joined HMAC-SHA512 (Gate family).
///
/// Payload is `METHOD\npath\nquery\nsha512hex(body)\nts_seconds`, signature
/// hex-encoded.
pub(super) fn sign_gate_sha512(
    req: &SignRequest,
    creds: &Credentials,
    cfg: &GateSigning,
    ctx: &SignContext,
) -> Result<SignedRequest> {
    let timestamp = (ctx.timestamp_ms / 1000).to_string();
    let query = if req.method.params_in_query() {
        req.encoded_query()
    } else {
        String::new()
    };
    let body = req.effective_body();

    let payload = format!(
        "{}\n{}\n{}\n{}\n{}",
        req.method.as_str(),
        req.path,
        query,
        sha512_hex(&body),
        timestamp
    );
    let signature = hex::encode(hmac_sha512(creds.secret.as_bytes(), payload.as_bytes()));

    Ok(SignedRequest {
        method: req.method,
        url: req.path_with_query(),
        headers: vec![
            (cfg.key_header.clone(), creds.api_key.clone()),
            (cfg.timestamp_header.clone(), timestamp),
            (cfg.sign_header.clone(), signature),
        ],
        body: carried_body(req),
    })
}

/// SHA-384 payload signing, Bitfinex and Gemini constructions.
pub(super) fn sign_payload_sha384(
    req: &SignRequest,
    creds: &Credentials,
    cfg: &PayloadSigning,
    ctx: &SignContext,
) -> Result<SignedRequest> {
    let nonce = ctx.nonce.to_string();
    match cfg.variant {
        PayloadVariant::Bitfinex => {
            let body = body_string(req);
            let payload = format!("{}{}{}{}", cfg.prefix, req.path, nonce, body);
            let signature = hex::encode(hmac_sha384(
                creds.secret.as_bytes(),
                payload.as_bytes(),
            ));
            let nonce_header = cfg
                .nonce_header
                .clone()
                .unwrap_or_else(|| "X-API-NONCE".to_string());

            Ok(SignedRequest {
                method: req.method,
                url: req.path_with_query(),
                headers: vec![
                    (cfg.key_header.clone(), creds.api_key.clone()),
                    (nonce_header, nonce),
                    (cfg.sign_header.clone(), signature),
                ],
                body: carried_body(req),
            })
        }
        PayloadVariant::Gemini => {
            let mut payload_fields: BTreeMap<String, serde_json::Value> = req
                .params
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            payload_fields.insert(
                "request".to_string(),
                serde_json::Value::String(req.path.clone()),
            );
            payload_fields.insert(
                "nonce".to_string(),
                serde_json::Value::String(nonce),
            );

            let payload_json = serde_json::to_vec(&payload_fields).unwrap_or_default();
            let payload_b64 = base64_encode(&payload_json);
            let signature = hex::encode(hmac_sha384(
                creds.secret.as_bytes(),
                payload_b64.as_bytes(),
            ));
            let payload_header = cfg
                .payload_header
                .clone()
                .unwrap_or_else(|| "X-API-PAYLOAD".to_string());

            Ok(SignedRequest {
                method: req.method,
                url: req.path.clone(),
                headers: vec![
                    (cfg.key_header.clone(), creds.api_key.clone()),
                    (payload_header, payload_b64),
                    (cfg.sign_header.clone(), signature),
                ],
                // The payload header carries the request content.
                body: None,
            })
        }
    }
}

/// `Authorization: deri-hmac-sha256` signing (Deribit).
///
/// Payload is `ts\nnonce\nMETHOD\npath?query\nbody\n`, signature hex.
pub(super) fn sign_deribit_sha256(
    req: &SignRequest,
    creds: &Credentials,
    ctx: &SignContext,
) -> Result<SignedRequest> {
    let timestamp = ctx.timestamp_ms.to_string();
    let nonce = ctx.nonce.to_string();
    let uri = req.path_with_query();
    let payload = format!(
        "{}\n{}\n{}\n{}\n{}\n",
        timestamp,
        nonce,
        req.method.as_str(),
        uri,
        body_string(req)
    );
    let signature = hex::encode(hmac_sha256(creds.secret.as_bytes(), payload.as_bytes()));

    Ok(SignedRequest {
        method: req.method,
        url: uri,
        headers: vec![(
            "Authorization".to_string(),
            format!(
                "deri-hmac-sha256 id={},ts={},sig={},nonce={}",
                creds.api_key, timestamp, signature, nonce
            ),
        )],
        body: carried_body(req),
    })
}
