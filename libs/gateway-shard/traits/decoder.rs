use crate::error::DecodeError;
use crate::events::{Event, EventName};
use serde_json::Value;
use std::fmt::Debug;

/// A dispatch frame (op 0) handed to the decoder
#[derive(Debug, Clone, Copy)]
pub struct RawDispatch<'a> {
    /// Event name (`t`), if the frame carried one
    pub name: Option<&'a str>,
    /// Sequence number (`s`)
    pub sequence: Option<u64>,
    /// Event body (`d`)
    pub data: &'a Value,
    /// The complete frame as received
    pub raw: &'a [u8],
}

/// Turns dispatch bodies into typed events
///
/// Decoding runs on the shard worker for every dispatch, in arrival order.
/// A decode error never affects the connection: the raw frame is published
/// on the failure stream instead and the sequence still advances.
///
/// # Example
///
/// ```ignore
/// struct MessagesOnly;
///
/// impl EventDecoder for MessagesOnly {
///     type Event = MessageCreate;
///
///     fn decode(&self, dispatch: &RawDispatch<'_>) -> Result<MessageCreate, DecodeError> {
///         Ok(serde_json::from_value(dispatch.data.clone())?)
///     }
/// }
/// ```
pub trait EventDecoder: Send + Sync + 'static {
    /// The decoded event type
    type Event: Clone + Send + Sync + Debug + 'static;

    /// Decode a single dispatch
    fn decode(&self, dispatch: &RawDispatch<'_>) -> Result<Self::Event, DecodeError>;
}

/// Decoder producing the generic [`Event`] record
///
/// Validates the envelope-level facts every event needs: a name, and a body
/// for every event except `RESUMED`. `READY` bodies are checked against the
/// [`Ready`](crate::protocol::Ready) shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventDecoder;

impl EventDecoder for JsonEventDecoder {
    type Event = Event;

    fn decode(&self, dispatch: &RawDispatch<'_>) -> Result<Event, DecodeError> {
        let name = dispatch.name.ok_or(DecodeError::MissingEventName)?;
        let name = EventName::from(name);

        if dispatch.data.is_null() && name != EventName::Resumed {
            return Err(DecodeError::MissingData(name.to_string()));
        }

        if name == EventName::Ready {
            serde_json::from_value::<crate::protocol::Ready>(dispatch.data.clone())?;
        }

        Ok(Event {
            name,
            sequence: dispatch.sequence,
            data: dispatch.data.clone(),
        })
    }
}
