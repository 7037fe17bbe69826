//! Managed WebSocket connections
//!
//! One adapter per long-lived connection. The adapter owns the socket,
//! tracks subscriptions, authenticates when the venue supports private
//! streams, and survives failures: lost connections reconnect with
//! exponential backoff, re-authenticate when the session was authenticated,
//! and re-send every retained subscription. Inbound frames are delivered to
//! the handler in receive order; outbound commands are sent in submission
//! order.

pub mod auth;
pub mod routing;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use types::{Credentials, ExchangeSpec, WsAuthConfig};

use crate::error::{ConnectorError, ErrorVariant, Result, TransportErrorKind};
use crate::signing::{MonotonicNonce, NonceSource};

pub use auth::{AuthAction, AuthMeta};
pub use routing::{render_topic, resolve_topic, RoutingError};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Adapter lifecycle configuration.
#[derive(Debug, Clone)]
pub struct WsAdapterConfig {
    /// Connection URL override; falls back to the spec's WS URLs
    pub url: Option<String>,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Base reconnect backoff
    pub base_backoff_ms: u64,
    /// Backoff ceiling
    pub max_backoff_ms: u64,
    /// Consecutive failed reconnects before the adapter stops
    pub max_reconnect_attempts: u32,
}

impl Default for WsAdapterConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout: Duration::from_secs(10),
            base_backoff_ms: 5_000,
            max_backoff_ms: 60_000,
            max_reconnect_attempts: 10,
        }
    }
}

/// A persistent intent to receive a stream, retained across reconnects.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Channel identity; one or more topics
    pub channels: Vec<String>,
    /// Frame sent to subscribe
    pub message: Value,
    /// Frame sent to unsubscribe; derived from `message` when absent
    pub unsubscribe_message: Option<Value>,
    /// Subscription method tag, e.g. `subscribe`
    pub method: String,
    /// Whether the topic needs an authenticated session
    pub auth_required: bool,
    /// Symbol/timeframe/limit parameters the subscription was built from
    pub params: BTreeMap<String, String>,
}

impl Subscription {
    /// Subscription for a single channel.
    pub fn new(channel: impl Into<String>, message: Value) -> Self {
        Self {
            channels: vec![channel.into()],
            message,
            unsubscribe_message: None,
            method: "subscribe".to_string(),
            auth_required: false,
            params: BTreeMap::new(),
        }
    }

    /// Subscription covering several channels in one frame.
    pub fn with_channels(channels: Vec<String>, message: Value) -> Self {
        Self {
            channels,
            message,
            unsubscribe_message: None,
            method: "subscribe".to_string(),
            auth_required: false,
            params: BTreeMap::new(),
        }
    }

    /// Mark the subscription as requiring authentication.
    pub fn with_auth(mut self) -> Self {
        self.auth_required = true;
        self
    }

    /// Attach the parameters the subscription was built from.
    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// Supply an explicit unsubscribe frame.
    pub fn with_unsubscribe_message(mut self, message: Value) -> Self {
        self.unsubscribe_message = Some(message);
        self
    }

    /// Channel identity used for deduplication.
    pub fn id(&self) -> String {
        self.channels.join("|")
    }

    /// Frame to send when unsubscribing: the explicit message when present,
    /// otherwise the subscribe frame with its method tag flipped.
    pub fn unsubscribe_frame(&self) -> Value {
        if let Some(message) = &self.unsubscribe_message {
            return message.clone();
        }
        let mut frame = self.message.clone();
        if let Some(obj) = frame.as_object_mut() {
            for key in ["op", "method", "event", "type"] {
                if let Some(Value::String(tag)) = obj.get_mut(key) {
                    if tag == "subscribe" {
                        *tag = "unsubscribe".to_string();
                    }
                }
            }
        }
        frame
    }
}

/// Build a subscription from a catalog channel template: resolve the topic
/// for the connection URL, substitute parameters, and wrap it in a generic
/// subscribe frame.
pub fn build_subscription(
    spec: &ExchangeSpec,
    url: &str,
    channel: &str,
    params: BTreeMap<String, String>,
) -> Result<Subscription> {
    let ws = spec.ws.as_ref().ok_or_else(|| {
        ConnectorError::not_supported(spec.id.clone(), "no websocket configuration")
    })?;
    let template = ws.channels.get(channel).ok_or_else(|| {
        ConnectorError::not_supported(
            spec.id.clone(),
            format!("unknown websocket channel '{}'", channel),
        )
    })?;
    let topic = resolve_topic(template, url).map_err(|e| {
        ConnectorError::invalid_parameters(spec.id.clone(), e.to_string())
    })?;
    let topic = render_topic(&topic, &params);

    let message = serde_json::json!({ "op": "subscribe", "args": [topic] });
    Ok(Subscription::new(topic, message).with_params(params))
}

/// Why the adapter stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit stop command
    Requested,
    /// Reconnect budget exhausted
    MaxReconnectAttempts,
}

/// Events delivered to the handler.
#[derive(Debug)]
pub enum WsEvent {
    /// Connection established; `reconnected` is false on the first connect
    Connected {
        /// True when this connect followed a failure
        reconnected: bool,
    },
    /// Inbound frame (text or binary; ping/pong are handled internally)
    Frame(Message),
    /// Connection lost; the adapter will back off and reconnect
    Disconnected {
        /// Human-readable cause
        reason: String,
    },
    /// The adapter stopped for good
    Stopped(StopReason),
}

/// Receiver of adapter events. Frames arrive in receive order.
pub trait WsHandler: Send + 'static {
    /// Handle one event.
    fn on_event(&mut self, event: WsEvent);
}

impl<F> WsHandler for F
where
    F: FnMut(WsEvent) + Send + 'static,
{
    fn on_event(&mut self, event: WsEvent) {
        self(event)
    }
}

/// Externally visible adapter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Establishing the connection
    Connecting,
    /// Connected and processing frames
    Connected,
    /// Waiting out a reconnect backoff
    Backoff,
    /// Stopped; the adapter will not reconnect
    Stopped,
}

/// Point-in-time adapter status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsStatus {
    /// Lifecycle state
    pub state: AdapterState,
    /// Frame-level auth is active on the current connection
    pub authenticated: bool,
    /// The session has been authenticated at least once since start
    pub was_authenticated: bool,
    /// Consecutive reconnect attempts so far
    pub reconnect_attempts: u32,
    /// Retained subscriptions
    pub subscriptions: usize,
}

#[derive(Debug)]
struct Shared {
    state: parking_lot::Mutex<AdapterState>,
    authenticated: AtomicBool,
    was_authenticated: AtomicBool,
    reconnect_attempts: AtomicU32,
    subscriptions: AtomicUsize,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: parking_lot::Mutex::new(AdapterState::Connecting),
            authenticated: AtomicBool::new(false),
            was_authenticated: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            subscriptions: AtomicUsize::new(0),
        }
    }

    fn set_state(&self, state: AdapterState) {
        *self.state.lock() = state;
    }
}

enum Command {
    Subscribe(Subscription),
    Unsubscribe(Subscription),
    Authenticate,
    MarkAuthenticated,
    SetAuthToken(String),
    Stop,
}

/// Handle to a running adapter. Dropping the handle does not stop the
/// connection; call [`WsAdapter::stop`].
pub struct WsAdapter {
    exchange: String,
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    task: tokio::task::JoinHandle<()>,
}

impl WsAdapter {
    /// Start an adapter for an exchange. Must be called inside a Tokio
    /// runtime; fails when the spec carries no WebSocket URL.
    pub fn start<H: WsHandler>(
        spec: Arc<ExchangeSpec>,
        config: WsAdapterConfig,
        credentials: Option<Credentials>,
        handler: H,
    ) -> Result<Self> {
        let url = config
            .url
            .clone()
            .or_else(|| spec.ws.as_ref().and_then(|w| w.url.clone()))
            .or_else(|| spec.urls.ws.clone())
            .ok_or_else(|| {
                ConnectorError::invalid_parameters(
                    spec.id.clone(),
                    "no websocket URL in spec or adapter config",
                )
            })?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new());
        let exchange = spec.id.clone();

        let actor = Actor {
            exchange: exchange.clone(),
            url,
            config,
            spec,
            credentials,
            handler,
            shared: Arc::clone(&shared),
            cmd_rx,
            subscriptions: Vec::new(),
            auth_token: None,
            nonce: MonotonicNonce::new(),
        };
        let task = tokio::spawn(actor.run());

        Ok(Self {
            exchange,
            cmd_tx,
            shared,
            task,
        })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.cmd_tx.send(command).map_err(|_| {
            ConnectorError::new(
                self.exchange.clone(),
                ErrorVariant::NetworkError {
                    kind: TransportErrorKind::ConnectionClosed,
                    detail: "adapter is stopped".to_string(),
                },
            )
        })
    }

    /// Subscribe; retained for restoration across reconnects. Idempotent on
    /// channel identity.
    pub fn subscribe(&self, subscription: Subscription) -> Result<()> {
        self.send(Command::Subscribe(subscription))
    }

    /// Unsubscribe and forget.
    pub fn unsubscribe(&self, subscription: Subscription) -> Result<()> {
        self.send(Command::Unsubscribe(subscription))
    }

    /// Build and send the venue's auth frame, when connected with
    /// credentials and an auth pattern.
    pub fn authenticate(&self) -> Result<()> {
        self.send(Command::Authenticate)
    }

    /// External signal that authentication happened out-of-band (listen-key
    /// or rest-token pre-auth).
    pub fn mark_authenticated(&self) -> Result<()> {
        self.send(Command::MarkAuthenticated)
    }

    /// Supply the token carried inside subscribe frames for the rest-token
    /// pattern.
    pub fn set_auth_token(&self, token: impl Into<String>) -> Result<()> {
        self.send(Command::SetAuthToken(token.into()))
    }

    /// Stop the adapter, releasing the socket and timers.
    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Snapshot of the adapter's state.
    pub fn status(&self) -> WsStatus {
        WsStatus {
            state: *self.shared.state.lock(),
            authenticated: self.shared.authenticated.load(Ordering::Relaxed),
            was_authenticated: self.shared.was_authenticated.load(Ordering::Relaxed),
            reconnect_attempts: self.shared.reconnect_attempts.load(Ordering::Relaxed),
            subscriptions: self.shared.subscriptions.load(Ordering::Relaxed),
        }
    }

    /// Wait for the adapter task to finish.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

enum LoopExit {
    Stop(StopReason),
    Lost(String),
}

struct Actor<H: WsHandler> {
    exchange: String,
    url: String,
    config: WsAdapterConfig,
    spec: Arc<ExchangeSpec>,
    credentials: Option<Credentials>,
    handler: H,
    shared: Arc<Shared>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    subscriptions: Vec<Subscription>,
    auth_token: Option<String>,
    nonce: MonotonicNonce,
}

impl<H: WsHandler> Actor<H> {
    async fn run(mut self) {
        let mut attempts: u32 = 0;
        let mut ever_connected = false;

        loop {
            self.shared.set_state(AdapterState::Connecting);
            debug!(exchange = %self.exchange, url = %self.url, attempts, "connecting websocket");

            let connected = match timeout(self.config.connect_timeout, connect_async(&self.url))
                .await
            {
                Ok(Ok((stream, response))) => {
                    info!(
                        exchange = %self.exchange,
                        status = response.status().as_u16(),
                        "websocket connected"
                    );
                    Some(stream)
                }
                Ok(Err(e)) => {
                    warn!(exchange = %self.exchange, error = %e, "websocket connect failed");
                    None
                }
                Err(_) => {
                    warn!(
                        exchange = %self.exchange,
                        timeout_ms = self.config.connect_timeout.as_millis() as u64,
                        "websocket connect timed out"
                    );
                    None
                }
            };

            if let Some(mut stream) = connected {
                attempts = 0;
                self.shared.reconnect_attempts.store(0, Ordering::Relaxed);
                self.shared.set_state(AdapterState::Connected);
                self.handler.on_event(WsEvent::Connected {
                    reconnected: ever_connected,
                });
                ever_connected = true;

                // Re-auth before restoring subscriptions, so private topics
                // land on an authenticated session.
                if self.shared.was_authenticated.load(Ordering::Relaxed) {
                    self.authenticate(&mut stream).await;
                }
                self.restore(&mut stream).await;

                match self.connected_loop(&mut stream).await {
                    LoopExit::Stop(reason) => {
                        let _ = stream.close(None).await;
                        self.finish(reason);
                        return;
                    }
                    LoopExit::Lost(reason) => {
                        warn!(exchange = %self.exchange, reason = %reason, "websocket connection lost");
                        self.shared.authenticated.store(false, Ordering::Relaxed);
                        self.handler.on_event(WsEvent::Disconnected { reason });
                    }
                }
            }

            // Backoff before the next attempt.
            let delay_ms = self
                .config
                .base_backoff_ms
                .saturating_mul(1u64 << attempts.min(16))
                .min(self.config.max_backoff_ms);
            attempts += 1;
            self.shared
                .reconnect_attempts
                .store(attempts, Ordering::Relaxed);

            if attempts > self.config.max_reconnect_attempts {
                error!(
                    exchange = %self.exchange,
                    max_attempts = self.config.max_reconnect_attempts,
                    "max reconnection attempts exceeded"
                );
                self.finish(StopReason::MaxReconnectAttempts);
                return;
            }

            self.shared.set_state(AdapterState::Backoff);
            info!(exchange = %self.exchange, delay_ms, attempt = attempts, "reconnecting after backoff");
            if self.backoff(Duration::from_millis(delay_ms)).await {
                self.finish(StopReason::Requested);
                return;
            }
        }
    }

    fn finish(&mut self, reason: StopReason) {
        self.shared.set_state(AdapterState::Stopped);
        self.handler.on_event(WsEvent::Stopped(reason));
        info!(exchange = %self.exchange, reason = ?reason, "websocket adapter stopped");
    }

    /// Wait out the backoff, still servicing commands. Returns true when a
    /// stop arrived.
    async fn backoff(&mut self, delay: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return false,
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(Command::Stop) => return true,
                    Some(cmd) => self.handle_offline_command(cmd),
                },
            }
        }
    }

    /// Commands arriving while disconnected mutate retained state only.
    fn handle_offline_command(&mut self, command: Command) {
        match command {
            Command::Subscribe(sub) => {
                let id = sub.id();
                if !self.subscriptions.iter().any(|s| s.id() == id) {
                    self.subscriptions.push(sub);
                    self.shared
                        .subscriptions
                        .store(self.subscriptions.len(), Ordering::Relaxed);
                    debug!(exchange = %self.exchange, channel = %id, "subscription retained while offline");
                }
            }
            Command::Unsubscribe(sub) => {
                let id = sub.id();
                self.subscriptions.retain(|s| s.id() != id);
                self.shared
                    .subscriptions
                    .store(self.subscriptions.len(), Ordering::Relaxed);
            }
            Command::Authenticate => {
                debug!(exchange = %self.exchange, "authenticate while offline; will re-auth on connect");
                self.shared
                    .was_authenticated
                    .store(true, Ordering::Relaxed);
            }
            Command::MarkAuthenticated => self.mark_authenticated(),
            Command::SetAuthToken(token) => self.auth_token = Some(token),
            Command::Stop => unreachable!("handled by callers"),
        }
    }

    fn mark_authenticated(&mut self) {
        self.shared.authenticated.store(true, Ordering::Relaxed);
        self.shared
            .was_authenticated
            .store(true, Ordering::Relaxed);
    }

    async fn connected_loop(&mut self, stream: &mut WsStream) -> LoopExit {
        enum Step {
            Frame(Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>),
            Cmd(Option<Command>),
        }

        loop {
            let step = {
                let cmd_rx = &mut self.cmd_rx;
                tokio::select! {
                    frame = stream.next() => Step::Frame(frame),
                    cmd = cmd_rx.recv() => Step::Cmd(cmd),
                }
            };

            match step {
                Step::Frame(Some(Ok(Message::Ping(payload)))) => {
                    if let Err(e) = stream.send(Message::Pong(payload)).await {
                        return LoopExit::Lost(format!("pong send failed: {}", e));
                    }
                }
                Step::Frame(Some(Ok(Message::Pong(_)))) => {}
                Step::Frame(Some(Ok(Message::Close(frame)))) => {
                    return LoopExit::Lost(format!("closed by peer: {:?}", frame));
                }
                Step::Frame(Some(Ok(message))) => {
                    self.handler.on_event(WsEvent::Frame(message));
                }
                Step::Frame(Some(Err(e))) => return LoopExit::Lost(e.to_string()),
                Step::Frame(None) => return LoopExit::Lost("stream ended".to_string()),

                Step::Cmd(None) | Step::Cmd(Some(Command::Stop)) => {
                    return LoopExit::Stop(StopReason::Requested);
                }
                Step::Cmd(Some(Command::Subscribe(sub))) => {
                    if let Err(e) = self.do_subscribe(stream, sub).await {
                        return LoopExit::Lost(e);
                    }
                }
                Step::Cmd(Some(Command::Unsubscribe(sub))) => {
                    if let Err(e) = self.do_unsubscribe(stream, sub).await {
                        return LoopExit::Lost(e);
                    }
                }
                Step::Cmd(Some(Command::Authenticate)) => {
                    self.authenticate(stream).await;
                }
                Step::Cmd(Some(Command::MarkAuthenticated)) => self.mark_authenticated(),
                Step::Cmd(Some(Command::SetAuthToken(token))) => {
                    self.auth_token = Some(token);
                }
            }
        }
    }

    /// Subscribe frame with per-subscribe auth fields merged in where the
    /// venue's pattern wants them.
    fn subscribe_frame(&self, sub: &Subscription) -> Value {
        let mut frame = sub.message.clone();
        if !sub.auth_required {
            return frame;
        }
        let auth_cfg = self.spec.ws.as_ref().and_then(|w| w.auth.as_ref());
        if let Some(obj) = frame.as_object_mut() {
            match auth_cfg {
                Some(WsAuthConfig::RestToken { token_field, .. }) => {
                    if let Some(token) = &self.auth_token {
                        obj.insert(token_field.clone(), Value::String(token.clone()));
                    } else {
                        warn!(
                            exchange = %self.exchange,
                            channel = %sub.id(),
                            "auth-required subscription without a token; call set_auth_token"
                        );
                    }
                }
                Some(WsAuthConfig::InlineSubscribe) => {
                    if let Some(creds) = &self.credentials {
                        let now = chrono::Utc::now().timestamp_millis();
                        for (key, value) in auth::inline_auth_fields(creds, now) {
                            obj.insert(key, value);
                        }
                    }
                }
                _ => {}
            }
        }
        frame
    }

    async fn do_subscribe(
        &mut self,
        stream: &mut WsStream,
        sub: Subscription,
    ) -> std::result::Result<(), String> {
        let id = sub.id();
        if self.subscriptions.iter().any(|s| s.id() == id) {
            debug!(exchange = %self.exchange, channel = %id, "already subscribed");
            return Ok(());
        }

        let frame = self.subscribe_frame(&sub);
        stream
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| format!("subscribe send failed: {}", e))?;

        debug!(exchange = %self.exchange, channel = %id, "subscribed");
        self.subscriptions.push(sub);
        self.shared
            .subscriptions
            .store(self.subscriptions.len(), Ordering::Relaxed);
        Ok(())
    }

    async fn do_unsubscribe(
        &mut self,
        stream: &mut WsStream,
        sub: Subscription,
    ) -> std::result::Result<(), String> {
        let id = sub.id();
        let frame = self
            .subscriptions
            .iter()
            .find(|s| s.id() == id)
            .map(|s| s.unsubscribe_frame())
            .unwrap_or_else(|| sub.unsubscribe_frame());

        stream
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| format!("unsubscribe send failed: {}", e))?;

        self.subscriptions.retain(|s| s.id() != id);
        self.shared
            .subscriptions
            .store(self.subscriptions.len(), Ordering::Relaxed);
        debug!(exchange = %self.exchange, channel = %id, "unsubscribed");
        Ok(())
    }

    /// Build and send the venue's auth frame. Failures are logged, never
    /// fatal; a broken socket surfaces through the read loop.
    async fn authenticate(&mut self, stream: &mut WsStream) {
        let Some(creds) = self.credentials.clone() else {
            debug!(exchange = %self.exchange, "authenticate without credentials; skipping");
            return;
        };
        let Some(auth_cfg) = self.spec.ws.as_ref().and_then(|w| w.auth.clone()) else {
            debug!(exchange = %self.exchange, "no websocket auth pattern configured");
            return;
        };

        let now = chrono::Utc::now().timestamp_millis();
        let (action, meta) = auth::build_auth(&auth_cfg, &creds, now, self.nonce.next());
        match action {
            AuthAction::Frame(frame) => {
                match stream.send(Message::Text(frame.to_string())).await {
                    Ok(()) => {
                        self.mark_authenticated();
                        info!(exchange = %self.exchange, "websocket auth frame sent");
                    }
                    Err(e) => {
                        warn!(exchange = %self.exchange, error = %e, "websocket auth send failed");
                    }
                }
            }
            AuthAction::RestPreAuth { endpoint } => {
                info!(
                    exchange = %self.exchange,
                    endpoint = %endpoint,
                    "authentication uses REST pre-auth; call mark_authenticated once done"
                );
            }
            AuthAction::PerSubscribe => {
                self.mark_authenticated();
                debug!(exchange = %self.exchange, "auth fields ride in subscribe frames");
            }
        }
        if let Some(expires_at_ms) = meta.expires_at_ms {
            debug!(exchange = %self.exchange, expires_at_ms, "auth session expiry");
        }
    }

    /// Re-send every retained subscription after a reconnect. Per-channel
    /// failures are logged; the rest of the restore proceeds.
    async fn restore(&mut self, stream: &mut WsStream) {
        if self.subscriptions.is_empty() {
            return;
        }
        let subs = self.subscriptions.clone();
        for sub in &subs {
            let frame = self.subscribe_frame(sub);
            if let Err(e) = stream.send(Message::Text(frame.to_string())).await {
                warn!(
                    exchange = %self.exchange,
                    channel = %sub.id(),
                    error = %e,
                    "failed to restore subscription"
                );
            }
        }
        info!(exchange = %self.exchange, count = subs.len(), "restored subscriptions");
    }
}
