//! tokio-tungstenite backed transport

use crate::error::TransportError;
use crate::traits::{CloseFrame, Connector, Transport, WsMessage};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::http::{header::RETRY_AFTER, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Used when a 429 carries no usable Retry-After header
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects with `tokio_tungstenite::connect_async` (TLS via native-tls)
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, _response) = connect_async(url).await.map_err(connect_error)?;
        debug!("WebSocket handshake completed");
        Ok(Box::new(TungsteniteTransport { stream }))
    }
}

fn connect_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::Http(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            TransportError::RateLimited { retry_after }
        }
        other => TransportError::Connect(other.to_string()),
    }
}

/// Retry-After in (possibly fractional) seconds
fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

pub struct TungsteniteTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn send(&mut self, message: WsMessage) -> Result<(), TransportError> {
        let message = match message {
            WsMessage::Text(text) => Message::Text(text),
            WsMessage::Binary(data) => Message::Binary(data),
            WsMessage::Close(frame) => Message::Close(frame.map(|frame| WsCloseFrame {
                code: WsCloseCode::from(frame.code),
                reason: frame.reason.into(),
            })),
        };
        self.stream.send(message).await.map_err(io_error)
    }

    async fn recv(&mut self) -> Option<Result<WsMessage, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None
                }
                Err(e) => return Some(Err(io_error(e))),
            };
            match message {
                Message::Text(text) => return Some(Ok(WsMessage::Text(text))),
                Message::Binary(data) => return Some(Ok(WsMessage::Binary(data))),
                Message::Close(frame) => {
                    return Some(Ok(WsMessage::Close(frame.map(|frame| CloseFrame {
                        code: u16::from(frame.code),
                        reason: frame.reason.into_owned(),
                    }))))
                }
                // Pongs are queued by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        let frame = WsCloseFrame {
            code: WsCloseCode::from(code),
            reason: "".into(),
        };
        match self.stream.close(Some(frame)).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}

fn io_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => TransportError::Closed,
        other => TransportError::Io(other.to_string()),
    }
}
