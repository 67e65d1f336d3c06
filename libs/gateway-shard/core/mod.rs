//! # Shard core
//!
//! Everything that runs one gateway connection:
//!
//! - **shard**: the worker task and its connection state machine
//! - **dispatcher**: frame classification, decoding and publishing
//! - **heartbeat**: tick task plus ack bookkeeping
//! - **rate_limiter**: outbound command budget
//! - **session**: resume state
//! - **websocket**: the tokio-tungstenite transport
//! - **builder** / **config**: type-state construction of the manager

pub mod builder;
pub mod config;
pub mod connection_state;
pub mod dispatcher;
pub mod heartbeat;
pub mod rate_limiter;
pub mod session;
pub mod shard;
pub mod websocket;

// Re-export main types
pub use builder::{states, GatewayBuilder};
pub use config::ShardConfig;
pub use connection_state::{AtomicMetrics, ConnectionPhase, Metrics, PhaseTracker, ShutdownSignal};
pub use heartbeat::{HeartbeatAction, HeartbeatController, HeartbeatState};
pub use rate_limiter::{CommandRateLimiter, RateBudget};
pub use session::Session;
pub use shard::ShardEvent;
pub use websocket::{TungsteniteConnector, TungsteniteTransport};

/// Create a new gateway builder
///
/// # Example
/// ```ignore
/// let manager = gateway_shard::builder()
///     .token(token)
///     .url("wss://gateway.discord.gg")
///     .intents(Intents::GUILDS)
///     .build()?;
/// ```
pub fn builder() -> GatewayBuilder<states::NoToken, states::NoUrl, crate::traits::JsonEventDecoder> {
    GatewayBuilder::new()
}
