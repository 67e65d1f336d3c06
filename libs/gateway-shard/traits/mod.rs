//! # Gateway Shard Traits
//!
//! The pluggable seams of the shard:
//!
//! - **Connector / Transport**: open and drive the raw frame stream
//! - **EventDecoder**: turn dispatch bodies into typed events
//! - **GatewayUrlResolver**: supply the URL to connect to
//! - **ReconnectionStrategy**: control backoff between connection attempts

pub mod decoder;
pub mod error;
pub mod reconnect;
pub mod resolver;
pub mod transport;

// Re-export commonly used types
pub use decoder::{EventDecoder, JsonEventDecoder, RawDispatch};
pub use error::{DecodeError, GatewayError, Result, TransportError};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use resolver::{GatewayUrlResolver, StaticGatewayUrl};
pub use transport::{CloseFrame, Connector, Transport, WsMessage};
