//! Common test utilities for gateway-shard integration tests
//!
//! Two fake gateways:
//!
//! - [`scripted`]: an in-memory connector. Every connection attempt hands a
//!   [`ServerSide`] to the test, which then plays the server frame by frame.
//! - [`MockGateway`]: a real tokio-tungstenite server speaking just enough of
//!   the protocol for end-to-end tests of the production transport.

#![allow(dead_code)]

use async_trait::async_trait;
use gateway_shard::{
    CloseFrame, Connector, FixedDelay, GatewayBuilder, GatewayManager, JsonEventDecoder, Transport,
    TransportError, WsMessage,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const TOKEN: &str = "Bot test-token";

/// How long a test waits for something that should happen promptly
pub const STEP_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Scripted in-memory gateway
// ============================================================================

/// Create a connector and the script handle that plays the server side
pub fn scripted() -> (ScriptedConnector, GatewayScript) {
    let (conns_tx, conns_rx) = mpsc::unbounded_channel();
    let urls = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::new(Mutex::new(VecDeque::new()));

    let connector = ScriptedConnector {
        conns_tx,
        urls: Arc::clone(&urls),
        failures: Arc::clone(&failures),
    };
    let script = GatewayScript {
        conns_rx,
        urls,
        failures,
    };
    (connector, script)
}

/// Builder preset wired to a scripted connector with fast reconnects
pub fn scripted_builder(
    connector: ScriptedConnector,
) -> GatewayBuilder<gateway_shard::states::HasToken, gateway_shard::states::HasUrl, JsonEventDecoder> {
    gateway_shard::builder()
        .token(TOKEN)
        .url("wss://gateway.test")
        .connector(connector)
        .reconnect_strategy(FixedDelay::new(Duration::from_millis(10), None))
}

pub struct ScriptedConnector {
    conns_tx: mpsc::UnboundedSender<ServerSide>,
    urls: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<VecDeque<TransportError>>>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        self.urls.lock().push(url.to_string());
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let stalled = Arc::new(AtomicBool::new(false));
        let server = ServerSide {
            to_client,
            from_client,
            stalled: Arc::clone(&stalled),
        };
        self.conns_tx
            .send(server)
            .map_err(|_| TransportError::Connect("script dropped".into()))?;

        Ok(Box::new(ScriptedTransport {
            inbound,
            outbound,
            stalled,
        }))
    }
}

struct ScriptedTransport {
    inbound: mpsc::UnboundedReceiver<WsMessage>,
    outbound: mpsc::UnboundedSender<WsMessage>,
    /// Writes never complete while set, like a socket whose peer stopped reading
    stalled: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, message: WsMessage) -> Result<(), TransportError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.outbound.send(message).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<Result<WsMessage, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let _ = self.outbound.send(WsMessage::Close(Some(CloseFrame {
            code,
            reason: String::new(),
        })));
        self.inbound.close();
        Ok(())
    }
}

/// Test-side handle collecting connection attempts
pub struct GatewayScript {
    conns_rx: mpsc::UnboundedReceiver<ServerSide>,
    urls: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<VecDeque<TransportError>>>,
}

impl GatewayScript {
    /// Wait for the client's next connection
    pub async fn accept(&mut self) -> ServerSide {
        tokio::time::timeout(STEP_TIMEOUT, self.conns_rx.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// A connection attempt that already happened, if any
    pub fn try_accept(&mut self) -> Option<ServerSide> {
        self.conns_rx.try_recv().ok()
    }

    /// Make the next connection attempt fail with `error`
    pub fn fail_next(&self, error: TransportError) {
        self.failures.lock().push_back(error);
    }

    /// URLs of every connection attempt so far
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

/// The server end of one scripted connection
pub struct ServerSide {
    to_client: mpsc::UnboundedSender<WsMessage>,
    from_client: mpsc::UnboundedReceiver<WsMessage>,
    stalled: Arc<AtomicBool>,
}

impl ServerSide {
    pub fn send_json(&self, value: Value) {
        let _ = self.to_client.send(WsMessage::Text(value.to_string()));
    }

    pub fn send_raw(&self, message: WsMessage) {
        let _ = self.to_client.send(message);
    }

    pub fn hello(&self, interval_ms: u64) {
        self.send_json(json!({"op": 10, "d": {"heartbeat_interval": interval_ms}}));
    }

    pub fn ready(&self, seq: u64, session_id: &str) {
        self.dispatch(
            seq,
            "READY",
            json!({
                "v": 10,
                "session_id": session_id,
                "resume_gateway_url": "wss://resume.gateway.test",
                "user": {"id": "1", "username": "bot"},
                "guilds": []
            }),
        );
    }

    pub fn resumed(&self, seq: u64) {
        self.send_json(json!({"op": 0, "s": seq, "t": "RESUMED", "d": null}));
    }

    pub fn dispatch(&self, seq: u64, name: &str, data: Value) {
        self.send_json(json!({"op": 0, "s": seq, "t": name, "d": data}));
    }

    pub fn heartbeat_ack(&self) {
        self.send_json(json!({"op": 11, "d": null}));
    }

    pub fn invalid_session(&self, resumable: bool) {
        self.send_json(json!({"op": 9, "d": resumable}));
    }

    pub fn request_reconnect(&self) {
        self.send_json(json!({"op": 7, "d": null}));
    }

    /// Close the connection with a close frame
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(WsMessage::Close(Some(CloseFrame {
            code,
            reason: reason.to_string(),
        })));
    }

    /// Next frame from the client, or `None` once it hung up
    pub async fn next_frame(&mut self) -> Option<WsMessage> {
        tokio::time::timeout(STEP_TIMEOUT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
    }

    /// A frame the client already sent, without waiting
    pub fn try_frame(&mut self) -> Option<WsMessage> {
        self.from_client.try_recv().ok()
    }

    /// Next JSON frame with the given op, skipping heartbeats unless asked for
    pub async fn expect_op(&mut self, op: u64) -> Value {
        loop {
            match self.next_frame().await {
                Some(WsMessage::Text(text)) => {
                    let value: Value = serde_json::from_str(&text).expect("client sent invalid JSON");
                    if value["op"] == op {
                        return value;
                    }
                    if value["op"] == 1 {
                        continue;
                    }
                    panic!("expected op {op}, got {value}");
                }
                Some(other) => panic!("expected op {op}, got {other:?}"),
                None => panic!("client hung up while waiting for op {op}"),
            }
        }
    }

    /// Wait until the client closes; returns its close code
    pub async fn expect_close(&mut self) -> Option<u16> {
        loop {
            match self.next_frame().await {
                Some(WsMessage::Close(frame)) => return frame.map(|frame| frame.code),
                Some(_) => continue,
                None => return None,
            }
        }
    }

    /// Stop reading: every later client write hangs
    pub fn stall_writes(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    /// Simulate a dropped connection without a close frame
    pub fn drop_connection(self) {}
}

/// Drive a fresh connection through hello, identify and READY
pub async fn handshake(server: &mut ServerSide, seq: u64, session_id: &str) -> Value {
    server.hello(45_000);
    let identify = server.expect_op(2).await;
    server.ready(seq, session_id);
    identify
}

/// Connect `manager` against `script`, completing the handshake
pub async fn connect_ready(
    manager: &Arc<GatewayManager<JsonEventDecoder>>,
    script: &mut GatewayScript,
    session_id: &str,
) -> ServerSide {
    let connecting = {
        let manager = Arc::clone(manager);
        tokio::spawn(async move { manager.connect().await })
    };
    let mut server = script.accept().await;
    handshake(&mut server, 1, session_id).await;
    connecting
        .await
        .expect("connect task panicked")
        .expect("connect failed");
    server
}

// ============================================================================
// tokio-tungstenite mock gateway
// ============================================================================

/// A mock gateway server over real WebSockets
///
/// On every connection it sends hello, answers identify with READY followed
/// by one MESSAGE_CREATE, acks heartbeats and records every frame it got.
pub struct MockGateway {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Value>>>,
    shutdown: Arc<Notify>,
}

impl MockGateway {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(Notify::new());

        let received_clone = Arc::clone(&received);
        let shutdown_clone = Arc::clone(&shutdown);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let received = Arc::clone(&received_clone);
                                let shutdown = Arc::clone(&shutdown_clone);
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, received, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => break,
                }
            }
        });

        Self {
            addr,
            received,
            shutdown,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        received: Arc<Mutex<Vec<Value>>>,
        shutdown: Arc<Notify>,
    ) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_async;
        use tokio_tungstenite::tungstenite::Message;

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();
        let hello = json!({"op": 10, "d": {"heartbeat_interval": 45_000}});
        if write.send(Message::Text(hello.to_string())).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => continue,
                    };
                    let Ok(frame) = serde_json::from_str::<Value>(&text) else { continue };
                    let op = frame["op"].as_u64();
                    received.lock().push(frame);

                    let replies = match op {
                        Some(1) => vec![json!({"op": 11, "d": null})],
                        Some(2) => vec![
                            json!({"op": 0, "s": 1, "t": "READY", "d": {
                                "v": 10, "session_id": "mock-session", "resume_gateway_url": null
                            }}),
                            json!({"op": 0, "s": 2, "t": "MESSAGE_CREATE", "d": {
                                "id": "100", "content": "hello from mock"
                            }}),
                        ],
                        _ => Vec::new(),
                    };
                    for reply in replies {
                        if write.send(Message::Text(reply.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                _ = shutdown.notified() => break,
            }
        }
    }

    /// Frames received from clients so far
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A server that refuses every upgrade with 429 and a Retry-After header
pub async fn start_rate_limited_server(retry_after_secs: u64) -> SocketAddr {
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::http::StatusCode;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let reject = |_: &Request, _: Response| -> Result<Response, ErrorResponse> {
                    let mut response = ErrorResponse::new(Some("slow down".to_string()));
                    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
                    response.headers_mut().insert(
                        "Retry-After",
                        retry_after_secs.to_string().parse().unwrap(),
                    );
                    Err(response)
                };
                let _ = tokio_tungstenite::accept_hdr_async(stream, reject).await;
            });
        }
    });

    addr
}
