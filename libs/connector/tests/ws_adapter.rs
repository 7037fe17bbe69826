//! Adapter lifecycle against a local WebSocket server: reconnect with
//! backoff, subscription restore, re-auth ordering, deduplication, stop.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use connector::{AdapterState, StopReason, Subscription, WsAdapter, WsAdapterConfig, WsEvent};
use types::ExchangeSpec;

struct WsServer {
    url: String,
    /// Text frames received, per accepted connection, in receive order.
    frames: Arc<Mutex<Vec<Vec<String>>>>,
}

/// Accepts connections forever. The first connection is dropped after
/// receiving `close_first_after` frames; later connections stay open.
async fn spawn_server(close_first_after: Option<usize>) -> WsServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let frames: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));

    let accept_frames = Arc::clone(&frames);
    tokio::spawn(async move {
        let mut index = 0usize;
        while let Ok((stream, _)) = listener.accept().await {
            accept_frames.lock().push(Vec::new());
            let conn_frames = Arc::clone(&accept_frames);
            let conn_index = index;
            index += 1;
            let close_after = if conn_index == 0 { close_first_after } else { None };

            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                let mut received = 0usize;
                while let Some(Ok(message)) = ws.next().await {
                    if let Message::Text(text) = message {
                        conn_frames.lock()[conn_index].push(text.to_string());
                        received += 1;
                        if close_after == Some(received) {
                            // Drop the socket to simulate client death.
                            break;
                        }
                    }
                }
            });
        }
    });

    WsServer {
        url: format!("ws://{}", addr),
        frames,
    }
}

fn spec(with_auth: bool) -> Arc<ExchangeSpec> {
    let mut ws = json!({ "channels": { "ticker": "ticker.{symbol}" } });
    if with_auth {
        ws["auth"] = json!({ "pattern": "generic-hmac" });
    }
    Arc::new(
        serde_json::from_value(json!({
            "id": "testex",
            "urls": { "api": "https://api.testex.com", "ws": "wss://ignored.example.com" },
            "signing": { "pattern": "headers-hmac-sha256" },
            "ws": ws,
        }))
        .unwrap(),
    )
}

fn fast_config(url: &str) -> WsAdapterConfig {
    WsAdapterConfig {
        url: Some(url.to_string()),
        connect_timeout: Duration::from_secs(5),
        base_backoff_ms: 50,
        max_backoff_ms: 200,
        max_reconnect_attempts: 10,
    }
}

fn event_channel() -> (
    impl FnMut(WsEvent) + Send + 'static,
    mpsc::UnboundedReceiver<String>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |event: WsEvent| {
        let tag = match event {
            WsEvent::Connected { reconnected: false } => "connected".to_string(),
            WsEvent::Connected { reconnected: true } => "reconnected".to_string(),
            WsEvent::Disconnected { .. } => "disconnected".to_string(),
            WsEvent::Frame(_) => "frame".to_string(),
            WsEvent::Stopped(StopReason::Requested) => "stopped:requested".to_string(),
            WsEvent::Stopped(StopReason::MaxReconnectAttempts) => "stopped:max".to_string(),
        };
        let _ = tx.send(tag);
    };
    (handler, rx)
}

async fn wait_for(rx: &mut mpsc::UnboundedReceiver<String>, tag: &str) {
    let deadline = Duration::from_secs(10);
    tokio::time::timeout(deadline, async {
        while let Some(event) = rx.recv().await {
            if event == tag {
                return;
            }
        }
        panic!("event channel closed while waiting for '{}'", tag);
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for '{}'", tag));
}

fn ticker_sub(symbol: &str) -> Subscription {
    let topic = format!("ticker.{}", symbol);
    Subscription::new(
        topic.clone(),
        json!({ "op": "subscribe", "args": [topic] }),
    )
}

#[tokio::test]
async fn reconnect_restores_subscriptions() {
    let server = spawn_server(Some(2)).await;
    let (handler, mut events) = event_channel();
    let adapter = WsAdapter::start(spec(false), fast_config(&server.url), None, handler).unwrap();

    wait_for(&mut events, "connected").await;
    adapter.subscribe(ticker_sub("BTC")).unwrap();
    adapter.subscribe(ticker_sub("ETH")).unwrap();

    // The server drops the connection after the second subscribe frame.
    wait_for(&mut events, "disconnected").await;
    wait_for(&mut events, "reconnected").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    {
        let frames = server.frames.lock();
        assert_eq!(frames.len(), 2, "one reconnect expected");
        assert_eq!(frames[0].len(), 2);
        // Both subscriptions are re-sent, in submission order.
        assert_eq!(frames[1].len(), 2);
        let first: Value = serde_json::from_str(&frames[1][0]).unwrap();
        let second: Value = serde_json::from_str(&frames[1][1]).unwrap();
        assert_eq!(first["args"][0], "ticker.BTC");
        assert_eq!(second["args"][0], "ticker.ETH");
    }

    let status = adapter.status();
    assert_eq!(status.state, AdapterState::Connected);
    assert_eq!(status.subscriptions, 2);
    assert_eq!(status.reconnect_attempts, 0, "reset on successful connect");

    adapter.stop().unwrap();
    wait_for(&mut events, "stopped:requested").await;
    adapter.join().await;
}

#[tokio::test]
async fn reauth_precedes_restore_on_reconnect() {
    let server = spawn_server(Some(2)).await;
    let (handler, mut events) = event_channel();
    let credentials = connector::Credentials::new("K", "S");
    let adapter = WsAdapter::start(
        spec(true),
        fast_config(&server.url),
        Some(credentials),
        handler,
    )
    .unwrap();

    wait_for(&mut events, "connected").await;
    adapter.authenticate().unwrap();
    adapter.subscribe(ticker_sub("BTC").with_auth()).unwrap();

    wait_for(&mut events, "disconnected").await;
    wait_for(&mut events, "reconnected").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    {
        let frames = server.frames.lock();
        assert_eq!(frames.len(), 2);
        // First connection: auth frame, then the subscribe.
        let auth: Value = serde_json::from_str(&frames[0][0]).unwrap();
        assert_eq!(auth["op"], "auth");
        assert_eq!(auth["api_key"], "K");

        // Reconnect: auth is re-sent before the restored subscription.
        assert!(frames[1].len() >= 2);
        let reauth: Value = serde_json::from_str(&frames[1][0]).unwrap();
        let restored: Value = serde_json::from_str(&frames[1][1]).unwrap();
        assert_eq!(reauth["op"], "auth");
        assert_eq!(restored["op"], "subscribe");
    }

    let status = adapter.status();
    assert!(status.authenticated);
    assert!(status.was_authenticated);

    adapter.stop().unwrap();
    wait_for(&mut events, "stopped:requested").await;
}

#[tokio::test]
async fn duplicate_subscriptions_are_deduplicated() {
    let server = spawn_server(None).await;
    let (handler, mut events) = event_channel();
    let adapter = WsAdapter::start(spec(false), fast_config(&server.url), None, handler).unwrap();

    wait_for(&mut events, "connected").await;
    adapter.subscribe(ticker_sub("BTC")).unwrap();
    adapter.subscribe(ticker_sub("BTC")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(server.frames.lock()[0].len(), 1, "second subscribe is a no-op");
    assert_eq!(adapter.status().subscriptions, 1);

    adapter.unsubscribe(ticker_sub("BTC")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    {
        let frames = server.frames.lock();
        assert_eq!(frames[0].len(), 2);
        let unsub: Value = serde_json::from_str(&frames[0][1]).unwrap();
        assert_eq!(unsub["op"], "unsubscribe");
    }
    assert_eq!(adapter.status().subscriptions, 0);

    adapter.stop().unwrap();
    wait_for(&mut events, "stopped:requested").await;
}

#[tokio::test]
async fn gives_up_after_max_reconnect_attempts() {
    // Bind and drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (handler, mut events) = event_channel();
    let config = WsAdapterConfig {
        url: Some(format!("ws://{}", addr)),
        connect_timeout: Duration::from_secs(1),
        base_backoff_ms: 10,
        max_backoff_ms: 20,
        max_reconnect_attempts: 2,
    };
    let adapter = WsAdapter::start(spec(false), config, None, handler).unwrap();

    wait_for(&mut events, "stopped:max").await;
    assert_eq!(adapter.status().state, AdapterState::Stopped);
    adapter.join().await;
}

#[tokio::test]
async fn mark_authenticated_drives_reauth_on_reconnect() {
    let server = spawn_server(Some(1)).await;
    let (handler, mut events) = event_channel();
    let credentials = connector::Credentials::new("K", "S");
    let adapter = WsAdapter::start(
        spec(true),
        fast_config(&server.url),
        Some(credentials),
        handler,
    )
    .unwrap();

    wait_for(&mut events, "connected").await;
    // REST-style pre-auth happened elsewhere; tell the adapter.
    adapter.mark_authenticated().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(adapter.status().was_authenticated);

    adapter.subscribe(ticker_sub("BTC")).unwrap();
    wait_for(&mut events, "disconnected").await;
    wait_for(&mut events, "reconnected").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    {
        let frames = server.frames.lock();
        // was_authenticated drives an auth frame ahead of the restore.
        let first: Value = serde_json::from_str(&frames[1][0]).unwrap();
        assert_eq!(first["op"], "auth");
    }

    adapter.stop().unwrap();
    wait_for(&mut events, "stopped:requested").await;
}
