//! # Gateway Shard
//!
//! A client for a real-time, WebSocket based bot gateway: it keeps one
//! authenticated session alive across network failures and turns the
//! server's dispatch frames into a stream of typed events.
//!
//! ## Features
//!
//! - **Connection state machine**: hello, identify or resume, ready, and
//!   automatic reconnection with backoff
//! - **Heartbeats**: jittered first beat, ack tracking, zombie detection
//! - **Command rate limiting**: outbound commands stay under the server's
//!   budget; callers wait with a bounded timeout instead of being dropped
//! - **Separate failure stream**: dispatches that fail to decode never
//!   disturb the connection or the event stream
//! - **Type-state builder**: token and endpoint are enforced at compile time
//!
//! ## Example
//!
//! ```rust,ignore
//! use gateway_shard::{Intents, Status, UpdatePresence};
//!
//! #[tokio::main]
//! async fn main() -> gateway_shard::Result<()> {
//!     let manager = gateway_shard::builder()
//!         .token(std::env::var("GATEWAY_TOKEN").unwrap_or_default())
//!         .url("wss://gateway.discord.gg")
//!         .intents(Intents::GUILDS | Intents::GUILD_MESSAGES)
//!         .build()?;
//!
//!     let mut events = manager.events();
//!     let mut failures = manager.failures();
//!     manager.connect().await?;
//!
//!     manager.update_presence(UpdatePresence::new(Status::Online)).await?;
//!
//!     loop {
//!         tokio::select! {
//!             Ok(event) = events.recv() => println!("{} #{:?}", event.name, event.sequence),
//!             Ok(failure) = failures.recv() => eprintln!("undecodable: {}", failure.error),
//!             else => break,
//!         }
//!     }
//!
//!     manager.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod events;
pub mod manager;
pub mod protocol;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use self::core::{
    builder, config, connection_state, dispatcher, heartbeat, rate_limiter, session, shard,
    websocket,
    builder::{states, GatewayBuilder},
    config::ShardConfig,
    connection_state::{AtomicMetrics, ConnectionPhase, Metrics, PhaseTracker, ShutdownSignal},
    heartbeat::{HeartbeatAction, HeartbeatController, HeartbeatState},
    rate_limiter::{CommandRateLimiter, RateBudget},
    session::Session,
    shard::ShardEvent,
    websocket::{TungsteniteConnector, TungsteniteTransport},
};

// Re-export events and protocol types
pub use events::{DecodeFailure, Event, EventName, EventStream, FailureStream, StreamError, Subscription};
pub use protocol::{
    Activity, CloseCode, GatewayPayload, IdentifyProperties, Intents, OpCode, RequestGuildMembers,
    Status, UpdatePresence, VoiceStateUpdate,
};

// Re-export manager
pub use manager::GatewayManager;
