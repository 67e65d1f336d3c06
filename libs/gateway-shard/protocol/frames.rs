//! Gateway frame envelope
//!
//! Every frame in either direction is `{ "op", "d", "s", "t" }`.

use super::{
    Hello, Identify, OpCode, RequestGuildMembers, Resume, UpdatePresence, VoiceStateUpdate,
};
use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    /// Operation code
    pub op: OpCode,

    /// Frame body
    #[serde(default)]
    pub d: Value,

    /// Sequence number (dispatch only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name (dispatch only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayPayload {
    fn command(op: OpCode, d: Value) -> Self {
        Self { op, d, s: None, t: None }
    }

    // === Outbound ===

    /// Heartbeat (op 1) carrying the last sequence seen, or null
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::command(
            OpCode::Heartbeat,
            last_sequence.map_or(Value::Null, |s| Value::Number(s.into())),
        )
    }

    /// Identify (op 2)
    pub fn identify(identify: &Identify) -> Result<Self, GatewayError> {
        Ok(Self::command(OpCode::Identify, serde_json::to_value(identify)?))
    }

    /// Resume (op 6)
    pub fn resume(resume: &Resume) -> Result<Self, GatewayError> {
        Ok(Self::command(OpCode::Resume, serde_json::to_value(resume)?))
    }

    /// Presence update (op 3)
    pub fn presence_update(presence: &UpdatePresence) -> Result<Self, GatewayError> {
        Ok(Self::command(OpCode::PresenceUpdate, serde_json::to_value(presence)?))
    }

    /// Voice state update (op 4)
    pub fn voice_state_update(update: &VoiceStateUpdate) -> Result<Self, GatewayError> {
        Ok(Self::command(OpCode::VoiceStateUpdate, serde_json::to_value(update)?))
    }

    /// Request guild members (op 8)
    pub fn request_guild_members(request: &RequestGuildMembers) -> Result<Self, GatewayError> {
        Ok(Self::command(OpCode::RequestGuildMembers, serde_json::to_value(request)?))
    }

    // === Inbound ===

    /// Read the Hello body (op 10)
    pub fn as_hello(&self) -> Result<Hello, GatewayError> {
        serde_json::from_value(self.d.clone())
            .map_err(|e| GatewayError::Protocol(format!("malformed hello: {e}")))
    }

    /// Read the resumable flag of an Invalid Session frame (op 9)
    pub fn as_invalid_session(&self) -> Result<bool, GatewayError> {
        self.d.as_bool().ok_or_else(|| {
            GatewayError::Protocol(format!("invalid session body is not a boolean: {}", self.d))
        })
    }

    // === Utilities ===

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl std::fmt::Display for GatewayPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.t, self.s) {
            (Some(t), Some(s)) => write!(f, "GatewayPayload(op={}, t={t}, s={s})", self.op),
            (Some(t), None) => write!(f, "GatewayPayload(op={}, t={t})", self.op),
            _ => write!(f, "GatewayPayload(op={})", self.op),
        }
    }
}
