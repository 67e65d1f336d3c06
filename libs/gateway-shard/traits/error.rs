use crate::protocol::CloseCode;
use std::time::Duration;
use thiserror::Error;

/// Main error type for gateway-shard
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// The gateway rejected the credentials (close 4004)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Identify was answered with non-resumable invalid sessions too many times in a row
    #[error("Identify rejected {attempts} times in a row")]
    IdentifyRejected { attempts: u32 },

    /// The gateway closed the connection with a code that forbids reconnecting
    #[error("Gateway closed the connection with fatal code {code}: {reason}")]
    FatalClose { code: CloseCode, reason: String },

    /// No command token became available before the deadline
    #[error("Command rate limited: no token available within {0:?}")]
    RateLimited(Duration),

    /// The manager was disconnected by the caller
    #[error("Manager disconnected")]
    Disconnected,

    /// A command was issued while no connection is ready
    #[error("Not connected: shard is {0}")]
    NotConnected(String),

    /// Reconnection strategy gave up
    #[error("Reconnection failed after {attempts} attempts: {reason}")]
    ReconnectionFailed { attempts: usize, reason: String },

    /// The server violated the protocol on a control frame
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Outbound frame could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

impl GatewayError {
    /// Whether this error ends the manager instead of triggering a reconnect
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::AuthenticationFailed(_)
                | GatewayError::IdentifyRejected { .. }
                | GatewayError::FatalClose { .. }
                | GatewayError::ReconnectionFailed { .. }
                | GatewayError::Configuration(_)
                | GatewayError::Disconnected
        )
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

/// Errors raised by a [`Transport`](crate::traits::Transport) or its connector
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The connection could not be opened
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// The server refused the upgrade and asked us to come back later
    #[error("Rate limited by server, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The peer closed the connection
    #[error("Transport closed")]
    Closed,

    /// Read/write failure on an open connection
    #[error("Transport I/O error: {0}")]
    Io(String),
}

impl From<TransportError> for GatewayError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Closed => GatewayError::ConnectionClosed("transport closed".into()),
            other => GatewayError::WebSocket(other.to_string()),
        }
    }
}

/// Failure to turn a dispatch body into an event
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("JSON decode error: {0}")]
    Json(String),

    #[error("Dispatch frame carries no event name")]
    MissingEventName,

    #[error("Event {0} carries no data")]
    MissingData(String),

    #[error("{0}")]
    Custom(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Json(e.to_string())
    }
}

/// Result type for gateway-shard operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(GatewayError::AuthenticationFailed("bad token".into()).is_fatal());
        assert!(GatewayError::IdentifyRejected { attempts: 5 }.is_fatal());
        assert!(GatewayError::Disconnected.is_fatal());
        assert!(!GatewayError::WebSocket("reset".into()).is_fatal());
        assert!(!GatewayError::RateLimited(Duration::from_secs(1)).is_fatal());
        assert!(!GatewayError::Protocol("bad hello".into()).is_fatal());
    }

    #[test]
    fn test_transport_error_conversion() {
        let closed: GatewayError = TransportError::Closed.into();
        assert!(matches!(closed, GatewayError::ConnectionClosed(_)));

        let io: GatewayError = TransportError::Io("broken pipe".into()).into();
        assert!(io.to_string().contains("broken pipe"));
    }
}
