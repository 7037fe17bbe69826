//! Signing inputs and outputs
//!
//! A [`SignRequest`] is the normalized unsigned call; a [`SignedRequest`] is
//! what the transport dispatches. Normalization rules are shared by every
//! pattern: GET/DELETE params travel in the query string, POST/PUT params are
//! JSON-encoded into the body unless an explicit body was supplied, and
//! URL-encoded signable strings order keys lexicographically.

use std::collections::BTreeMap;

use types::HttpMethod;

/// Unsigned request handed to the signing engine.
#[derive(Debug, Clone)]
pub struct SignRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Path relative to the base URL
    pub path: String,
    /// Request parameters; ordered lexicographically by key
    pub params: BTreeMap<String, String>,
    /// Explicit body; when present it is signed verbatim
    pub body: Option<Vec<u8>>,
}

impl SignRequest {
    /// Request with no params and no body.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: BTreeMap::new(),
            body: None,
        }
    }

    /// Add one parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replace the parameter map.
    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// Supply an explicit body, signed verbatim.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// URL-encoded query string over the params, keys in lexicographic
    /// order. Empty string when there are no params.
    pub fn encoded_query(&self) -> String {
        encode_pairs(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Body bytes for signing under the shared normalization rules:
    /// the explicit body verbatim when present, otherwise JSON-encoded
    /// params for POST/PUT, otherwise empty.
    pub fn effective_body(&self) -> Vec<u8> {
        if let Some(body) = &self.body {
            return body.clone();
        }
        if !self.method.params_in_query() && !self.params.is_empty() {
            // BTreeMap serializes with sorted keys, so the signed JSON
            // bytes are deterministic.
            return serde_json::to_vec(&self.params).unwrap_or_default();
        }
        Vec::new()
    }

    /// Path plus query for methods whose params travel in the URL.
    pub fn path_with_query(&self) -> String {
        if self.method.params_in_query() && !self.params.is_empty() {
            format!("{}?{}", self.path, self.encoded_query())
        } else {
            self.path.clone()
        }
    }
}

/// URL-encode an ordered sequence of key/value pairs.
pub fn encode_pairs<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Signed request ready for dispatch.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Path, possibly with query, relative to the base URL
    pub url: String,
    /// Headers in insertion order
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Option<Vec<u8>>,
}

impl SignedRequest {
    /// Case-insensitive header lookup, for tests and logging.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Deterministic inputs for one signing operation.
///
/// Produced by the engine from its clock and nonce source; supplied directly
/// in tests.
#[derive(Debug, Clone)]
pub struct SignContext {
    /// Wall-clock milliseconds since epoch
    pub timestamp_ms: i64,
    /// Strictly monotonic nonce
    pub nonce: u64,
    /// Receive window to convey, when configured or requested
    pub recv_window_ms: Option<u64>,
    /// Broker marker appended by patterns that carry one
    pub broker_id: Option<String>,
}

impl SignContext {
    /// Context with just a timestamp and nonce.
    pub fn new(timestamp_ms: i64, nonce: u64) -> Self {
        Self {
            timestamp_ms,
            nonce,
            recv_window_ms: None,
            broker_id: None,
        }
    }
}
