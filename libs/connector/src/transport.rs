//! HTTP transport abstraction
//!
//! The pipeline dispatches through this trait so the HTTP client stays
//! interchangeable: `reqwest` in production, hand-rolled fakes in tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use types::HttpMethod;

use crate::error::TransportErrorKind;

/// Fully prepared HTTP request: absolute URL, signed headers, body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL
    pub url: String,
    /// Headers in insertion order
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Option<Vec<u8>>,
}

/// Raw HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body bytes
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON, when it is JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Body as UTF-8 text, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failure: no HTTP response was obtained.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {detail}")]
pub struct TransportFailure {
    /// Failure class
    pub kind: TransportErrorKind,
    /// Human-readable detail
    pub detail: String,
}

impl TransportFailure {
    /// Build a failure.
    pub fn new(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Interchangeable HTTP client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue one request, honoring the deadline. A deadline miss is a
    /// `Timeout` transport failure.
    async fn execute(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportFailure>;
}

/// Production transport over a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Transport with a fresh client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport over an existing client (shared pools, proxies, TLS setup).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn classify_error(error: &reqwest::Error) -> TransportErrorKind {
        if error.is_timeout() {
            return TransportErrorKind::Timeout;
        }
        if error.is_connect() {
            // reqwest folds DNS failures into connect errors; inspect the
            // rendered chain to keep the classes apart.
            let text = format!("{:?}", error);
            if text.contains("dns") || text.contains("resolve") {
                return TransportErrorKind::Dns;
            }
            return TransportErrorKind::ConnectionRefused;
        }
        if error.is_body() || error.is_decode() {
            return TransportErrorKind::ConnectionClosed;
        }
        TransportErrorKind::Other
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportFailure> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            TransportFailure::new(Self::classify_error(&e), e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportFailure::new(TransportErrorKind::ConnectionClosed, e.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
