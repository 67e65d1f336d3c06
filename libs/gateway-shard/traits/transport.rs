use crate::error::TransportError;
use async_trait::async_trait;

/// Close frame received from (or sent to) the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

/// A single WebSocket frame as seen by the shard
///
/// Pings and pongs are handled by the transport and never surface here.
#[derive(Debug, Clone, PartialEq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<CloseFrame>),
}

impl WsMessage {
    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Raw payload bytes of a data frame
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            WsMessage::Text(s) => Some(s.as_bytes()),
            WsMessage::Binary(b) => Some(b),
            WsMessage::Close(_) => None,
        }
    }

    /// Check if message is a close frame
    pub fn is_close(&self) -> bool {
        matches!(self, WsMessage::Close(_))
    }
}

/// An open, bidirectional frame stream
///
/// `recv` must be cancel-safe: the shard polls it inside `tokio::select!`
/// alongside timers and commands.
#[async_trait]
pub trait Transport: Send {
    /// Send one frame
    async fn send(&mut self, message: WsMessage) -> Result<(), TransportError>;

    /// Receive the next frame; `None` once the stream has ended
    async fn recv(&mut self) -> Option<Result<WsMessage, TransportError>>;

    /// Close the connection with the given close code
    async fn close(&mut self, code: u16) -> Result<(), TransportError>;
}

/// Opens transports against a gateway URL
///
/// Called once per connection attempt, including every reconnection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}
