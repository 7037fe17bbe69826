//! Unified request pipeline
//!
//! Orchestrates one REST call: circuit breaker admission, rate-limit
//! accounting, signing, dispatch through the injected transport, breaker
//! feedback, and error classification. Limiter and breaker state are
//! process-wide; every [`ExchangeClient`] handed out by a [`Connector`]
//! shares them.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use types::{Credentials, Endpoint, ExchangeSpec, HttpMethod};

use crate::circuit_breaker::{CircuitBreakerRegistry, CircuitDecision, RequestOutcome};
use crate::classify::{classify_response, classify_transport, hints_for};
use crate::config::ConnectorOptions;
use crate::error::{ConnectorError, ErrorVariant, Result};
use crate::rate_limit::{Admission, LimitKey, SlidingWindowLimiter};
use crate::signing::{Signer, SigningEngine, SignRequest, SignedRequest};
use crate::telemetry::{TelemetrySink, TracingTelemetry};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportFailure};

struct Inner {
    options: ConnectorOptions,
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<SlidingWindowLimiter>,
    breaker: CircuitBreakerRegistry,
    signing: SigningEngine,
    cleanup: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup.lock().take() {
            handle.abort();
        }
    }
}

/// Builder for a process-wide [`Connector`].
pub struct ConnectorBuilder {
    options: ConnectorOptions,
    transport: Option<Arc<dyn HttpTransport>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    signing: SigningEngine,
}

impl Default for ConnectorBuilder {
    fn default() -> Self {
        Self {
            options: ConnectorOptions::default(),
            transport: None,
            telemetry: None,
            signing: SigningEngine::new(),
        }
    }
}

impl ConnectorBuilder {
    /// Override the runtime options.
    pub fn options(mut self, options: ConnectorOptions) -> Self {
        self.options = options;
        self
    }

    /// Inject an HTTP transport (defaults to `reqwest`).
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Inject a telemetry sink (defaults to `tracing` events).
    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Replace the signing engine (custom clock or nonce source).
    pub fn signing(mut self, signing: SigningEngine) -> Self {
        self.signing = signing;
        self
    }

    /// Register a caller-supplied signer for catalog `custom` patterns.
    pub fn register_signer(mut self, module: impl Into<String>, signer: Arc<dyn Signer>) -> Self {
        self.signing.register(module, signer);
        self
    }

    /// Build the connector. When called inside a Tokio runtime the
    /// rate-limit maintenance task starts immediately; otherwise call
    /// [`Connector::start_maintenance`] once a runtime exists.
    pub fn build(self) -> Connector {
        let telemetry = self
            .telemetry
            .unwrap_or_else(|| Arc::new(TracingTelemetry));
        let limiter = Arc::new(SlidingWindowLimiter::with_eviction_horizon(
            self.options.rate_limit_max_age_ms,
        ));
        let breaker =
            CircuitBreakerRegistry::with_telemetry(self.options.circuit_breaker, telemetry);

        let connector = Connector {
            inner: Arc::new(Inner {
                transport: self
                    .transport
                    .unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
                limiter,
                breaker,
                signing: self.signing,
                cleanup: Mutex::new(None),
                options: self.options,
            }),
        };
        if tokio::runtime::Handle::try_current().is_ok() {
            connector.start_maintenance();
        }
        connector
    }
}

/// Process-wide connector: shared limiter, breaker, signing engine, and
/// transport. Hand out one [`ExchangeClient`] per exchange spec.
#[derive(Clone)]
pub struct Connector {
    inner: Arc<Inner>,
}

impl Default for Connector {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Connector {
    /// Start building a connector.
    pub fn builder() -> ConnectorBuilder {
        ConnectorBuilder::default()
    }

    /// Spawn the rate-limit maintenance task if not already running.
    pub fn start_maintenance(&self) {
        let mut slot = self.inner.cleanup.lock();
        if slot.is_none() {
            *slot = Some(
                self.inner
                    .limiter
                    .spawn_cleanup(self.inner.options.cleanup_interval()),
            );
        }
    }

    /// Client for one exchange.
    pub fn client(&self, spec: Arc<ExchangeSpec>) -> ExchangeClient {
        ExchangeClient {
            inner: Arc::clone(&self.inner),
            spec,
        }
    }

    /// The shared rate limiter.
    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.inner.limiter
    }

    /// The shared circuit breaker registry.
    pub fn breaker(&self) -> &CircuitBreakerRegistry {
        &self.inner.breaker
    }

    /// The runtime options.
    pub fn options(&self) -> &ConnectorOptions {
        &self.inner.options
    }
}

/// Request pipeline bound to one exchange spec.
#[derive(Clone)]
pub struct ExchangeClient {
    inner: Arc<Inner>,
    spec: Arc<ExchangeSpec>,
}

impl ExchangeClient {
    /// The exchange spec this client serves.
    pub fn spec(&self) -> &ExchangeSpec {
        &self.spec
    }

    fn limit_key(&self, credentials: Option<&Credentials>) -> LimitKey {
        match credentials {
            Some(creds) => LimitKey::keyed(self.spec.id.clone(), creds.key_id()),
            None => LimitKey::public(self.spec.id.clone()),
        }
    }

    fn base_url(&self, credentials: Option<&Credentials>) -> &str {
        let sandbox = credentials.map(|c| c.sandbox).unwrap_or(false);
        self.spec.urls.rest_base(sandbox)
    }

    /// Call a unified endpoint from the catalog, with retries per the
    /// configured policy.
    pub async fn request(
        &self,
        endpoint: &str,
        params: BTreeMap<String, String>,
        credentials: Option<&Credentials>,
    ) -> Result<HttpResponse> {
        let descriptor = self.spec.endpoint(endpoint).ok_or_else(|| {
            ConnectorError::not_supported(
                self.spec.id.clone(),
                format!("endpoint '{}' is not in the catalog", endpoint),
            )
            .with_endpoint(endpoint)
        })?;

        if descriptor.auth && credentials.is_none() {
            return Err(ConnectorError::new(
                self.spec.id.clone(),
                ErrorVariant::InvalidCredentials,
            )
            .with_endpoint(endpoint)
            .with_hints(vec![format!(
                "endpoint '{}' requires credentials",
                endpoint
            )]));
        }

        let symbol = params.get("symbol").cloned();
        let result = self
            .run_with_retries(Some(descriptor), &params, credentials)
            .await;

        result.map_err(|mut err| {
            if err.symbol.is_none() {
                err.symbol = symbol;
            }
            err
        })
    }

    /// Lower-level entry point: method and path outside the catalog, still
    /// signed (when requested) and classified.
    pub async fn request_path(
        &self,
        method: HttpMethod,
        path: &str,
        params: BTreeMap<String, String>,
        credentials: Option<&Credentials>,
    ) -> Result<HttpResponse> {
        let auth = credentials.is_some();
        let descriptor = Endpoint {
            name: String::new(),
            method,
            path: path.to_string(),
            auth,
            params: Vec::new(),
            cost: None,
        };
        self.attempt(Some(&descriptor), None, &params, credentials)
            .await
    }

    /// Raw escape hatch: dispatch a fully prebuilt request with no signing,
    /// no accounting, and no classification.
    pub async fn request_prebuilt(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<HttpResponse, TransportFailure> {
        self.inner
            .transport
            .execute(request, self.inner.options.request_timeout())
            .await
    }

    async fn run_with_retries(
        &self,
        descriptor: Option<&Endpoint>,
        params: &BTreeMap<String, String>,
        credentials: Option<&Credentials>,
    ) -> Result<HttpResponse> {
        let endpoint_name = descriptor.map(|d| d.name.as_str()).filter(|n| !n.is_empty());
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self
                .attempt(descriptor, endpoint_name, params, credentials)
                .await
            {
                Ok(response) => return Ok(response),
                Err(error) => match self.inner.options.retry.next_delay(&error, attempts) {
                    Some(delay) => {
                        warn!(
                            exchange = %self.spec.id,
                            endpoint = endpoint_name.unwrap_or("-"),
                            attempt = attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "retrying recoverable error"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(error),
                },
            }
        }
    }

    async fn attempt(
        &self,
        descriptor: Option<&Endpoint>,
        endpoint_name: Option<&str>,
        params: &BTreeMap<String, String>,
        credentials: Option<&Credentials>,
    ) -> Result<HttpResponse> {
        let exchange = self.spec.id.as_str();

        // 1. Circuit breaker admission.
        if self.inner.breaker.check(exchange) == CircuitDecision::Blown {
            let mut err = ConnectorError::new(exchange, ErrorVariant::CircuitOpen)
                .with_hints(hints_for(types::ErrorKind::CircuitOpen, &self.spec, endpoint_name));
            if let Some(name) = endpoint_name {
                err = err.with_endpoint(name);
            }
            return Err(err);
        }

        // 2. Rate-limit accounting.
        let key = self.limit_key(credentials);
        let cost = descriptor.map(|d| d.rate_limit_cost()).unwrap_or(1.0);
        let policy = self.spec.rate_limits;
        if self.inner.options.blocking_rate_limit {
            self.inner.limiter.wait(&key, policy.as_ref(), cost).await;
        } else if let Admission::Delayed(delay_ms) =
            self.inner.limiter.check(&key, policy.as_ref(), cost)
        {
            let mut err = ConnectorError::new(
                exchange,
                ErrorVariant::RateLimited {
                    retry_after_ms: Some(delay_ms),
                },
            );
            if let Some(name) = endpoint_name {
                err = err.with_endpoint(name);
            }
            return Err(err);
        }

        // 3. Sign, or assemble the unsigned request.
        let (method, path, auth) = match descriptor {
            Some(d) => (d.method, d.path.as_str(), d.auth),
            None => (HttpMethod::Get, "/", false),
        };
        let sign_request = SignRequest::new(method, path).with_params(params.clone());

        let signed = if auth {
            let credentials = credentials.ok_or_else(|| {
                ConnectorError::new(exchange, ErrorVariant::InvalidCredentials)
            })?;
            let recv_window = self
                .inner
                .options
                .auto_recv_window
                .then_some(self.inner.options.recv_window_ms);
            self.inner.signing.sign(
                exchange,
                &sign_request,
                credentials,
                &self.spec.signing,
                recv_window,
                self.inner.options.broker_id.clone(),
            )?
        } else {
            SignedRequest {
                method,
                url: sign_request.path_with_query(),
                headers: Vec::new(),
                body: {
                    let body = sign_request.effective_body();
                    if body.is_empty() {
                        None
                    } else {
                        Some(body)
                    }
                },
            }
        };

        // 4. Dispatch.
        let url = format!("{}{}", self.base_url(credentials), signed.url);
        let mut headers = signed.headers;
        if signed.body.is_some()
            && !headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        debug!(
            exchange,
            endpoint = endpoint_name.unwrap_or("-"),
            method = %method,
            url = %url,
            "dispatching request"
        );

        let outcome = self
            .inner
            .transport
            .execute(
                HttpRequest {
                    method,
                    url,
                    headers,
                    body: signed.body,
                },
                self.inner.options.request_timeout(),
            )
            .await;

        // 5. Breaker feedback, 6. classification.
        match outcome {
            Err(failure) => {
                self.inner
                    .breaker
                    .record(exchange, RequestOutcome::Transport(failure.kind));
                Err(classify_transport(&self.spec, endpoint_name, &failure))
            }
            Ok(response) => {
                self.inner
                    .breaker
                    .record(exchange, RequestOutcome::Status(response.status));
                match classify_response(&self.spec, endpoint_name, &response) {
                    Some(error) => Err(error),
                    None => Ok(response),
                }
            }
        }
    }
}
