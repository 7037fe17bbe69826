//! HMAC and digest helpers shared by the REST and WebSocket auth patterns

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384, Sha512};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use types::SignatureEncoding;

pub(crate) fn hmac_sha256(key: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn hmac_sha384(key: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha384>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn hmac_sha512(key: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha512>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn sha256_digest(payload: &[u8]) -> Vec<u8> {
    Sha256::digest(payload).to_vec()
}

pub(crate) fn sha512_hex(payload: &[u8]) -> String {
    hex::encode(Sha512::digest(payload))
}

pub(crate) fn encode_signature(signature: &[u8], encoding: SignatureEncoding) -> String {
    match encoding {
        SignatureEncoding::Hex => hex::encode(signature),
        SignatureEncoding::Base64 => BASE64.encode(signature),
    }
}

pub(crate) fn base64_encode(payload: &[u8]) -> String {
    BASE64.encode(payload)
}

/// Base64-decode a secret, falling back to the raw bytes when the secret is
/// not valid base64. Signing never fails on credential content.
pub(crate) fn decode_secret(secret: &str) -> Vec<u8> {
    BASE64
        .decode(secret.as_bytes())
        .unwrap_or_else(|_| secret.as_bytes().to_vec())
}
