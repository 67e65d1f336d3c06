//! Gateway wire protocol
//!
//! Op codes, close codes, the frame envelope and the payload records the
//! shard reads and writes.

pub mod close_codes;
pub mod frames;
pub mod intents;
pub mod opcodes;
pub mod payloads;

pub use close_codes::{CloseAction, CloseCode};
pub use frames::GatewayPayload;
pub use intents::Intents;
pub use opcodes::OpCode;
pub use payloads::{
    Activity, Hello, Identify, IdentifyProperties, Ready, RequestGuildMembers, Resume, Status,
    UpdatePresence, VoiceStateUpdate,
};

/// Gateway API version the shard speaks
pub const API_VERSION: u8 = 10;
