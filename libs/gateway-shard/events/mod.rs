//! Decoded events and the streams that deliver them
//!
//! The shard worker is the only publisher. Each call to
//! [`GatewayManager::events`](crate::GatewayManager::events) creates an
//! independent subscriber that sees every event published after it
//! subscribed, in transport order.

pub mod stream;

use crate::error::DecodeError;
use serde_json::Value;

pub use stream::{EventBus, StreamError, Subscription};

/// Stream of decoded events
pub type EventStream<E> = Subscription<E>;

/// Stream of dispatches that failed to decode
pub type FailureStream = Subscription<DecodeFailure>;

/// Event produced by [`JsonEventDecoder`](crate::JsonEventDecoder)
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: EventName,
    pub sequence: Option<u64>,
    pub data: Value,
}

/// A dispatch that could not be decoded
///
/// Carries the complete frame so callers can log or re-parse it.
#[derive(Debug, Clone)]
pub struct DecodeFailure {
    pub error: DecodeError,
    pub raw: Vec<u8>,
}

impl DecodeFailure {
    /// The raw frame as text, if it is valid UTF-8
    pub fn raw_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.raw).ok()
    }
}

macro_rules! event_names {
    ($($variant:ident => $wire:literal),+ $(,)?) => {
        /// Dispatch event names
        ///
        /// Names this crate does not know are kept verbatim in [`EventName::Unknown`].
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum EventName {
            $($variant,)+
            Unknown(String),
        }

        impl EventName {
            /// The name as sent on the wire
            pub fn as_str(&self) -> &str {
                match self {
                    $(EventName::$variant => $wire,)+
                    EventName::Unknown(name) => name,
                }
            }
        }

        impl From<&str> for EventName {
            fn from(name: &str) -> Self {
                match name {
                    $($wire => EventName::$variant,)+
                    other => EventName::Unknown(other.to_string()),
                }
            }
        }
    };
}

event_names! {
    Ready => "READY",
    Resumed => "RESUMED",
    GuildCreate => "GUILD_CREATE",
    GuildUpdate => "GUILD_UPDATE",
    GuildDelete => "GUILD_DELETE",
    GuildMembersChunk => "GUILD_MEMBERS_CHUNK",
    GuildMemberAdd => "GUILD_MEMBER_ADD",
    GuildMemberUpdate => "GUILD_MEMBER_UPDATE",
    GuildMemberRemove => "GUILD_MEMBER_REMOVE",
    ChannelCreate => "CHANNEL_CREATE",
    ChannelUpdate => "CHANNEL_UPDATE",
    ChannelDelete => "CHANNEL_DELETE",
    MessageCreate => "MESSAGE_CREATE",
    MessageUpdate => "MESSAGE_UPDATE",
    MessageDelete => "MESSAGE_DELETE",
    MessageReactionAdd => "MESSAGE_REACTION_ADD",
    MessageReactionRemove => "MESSAGE_REACTION_REMOVE",
    PresenceUpdate => "PRESENCE_UPDATE",
    TypingStart => "TYPING_START",
    UserUpdate => "USER_UPDATE",
    VoiceStateUpdate => "VOICE_STATE_UPDATE",
    VoiceServerUpdate => "VOICE_SERVER_UPDATE",
    InteractionCreate => "INTERACTION_CREATE",
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_mapping() {
        assert_eq!(EventName::from("READY"), EventName::Ready);
        assert_eq!(EventName::from("GUILD_MEMBERS_CHUNK"), EventName::GuildMembersChunk);
        assert_eq!(EventName::MessageCreate.as_str(), "MESSAGE_CREATE");
        assert_eq!(
            EventName::from("AUTO_MODERATION_ACTION_EXECUTION"),
            EventName::Unknown("AUTO_MODERATION_ACTION_EXECUTION".into())
        );
        assert_eq!(
            EventName::Unknown("X_Y".into()).to_string(),
            "X_Y"
        );
    }

    #[test]
    fn test_raw_text() {
        let failure = DecodeFailure {
            error: DecodeError::MissingEventName,
            raw: br#"{"op":0}"#.to_vec(),
        };
        assert_eq!(failure.raw_text(), Some(r#"{"op":0}"#));
    }
}
