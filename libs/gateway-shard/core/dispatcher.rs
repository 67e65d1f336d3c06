//! Inbound frame routing
//!
//! Classifies every received frame by op code. Dispatches (op 0) advance the
//! session sequence and are decoded and published here; everything else is
//! handed back to the shard worker as a [`Routed`] control signal.

use crate::connection_state::AtomicMetrics;
use crate::error::{DecodeError, GatewayError, Result};
use crate::events::{DecodeFailure, EventBus};
use crate::protocol::{GatewayPayload, OpCode, Ready};
use crate::session::Session;
use crate::traits::{CloseFrame, EventDecoder, RawDispatch, WsMessage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Control signal produced by routing one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Hello(Duration),
    HeartbeatAck,
    /// The server asked for an immediate heartbeat (op 1)
    HeartbeatRequest,
    /// READY was dispatched and the session now carries its identity
    Ready,
    Resumed,
    Reconnect,
    InvalidSession { resumable: bool },
    Closed(Option<CloseFrame>),
    /// An ordinary dispatch was handled
    Dispatched,
    /// Nothing for the state machine to do
    Ignored,
}

pub struct Dispatcher<D: EventDecoder> {
    decoder: Arc<D>,
    bus: EventBus<D::Event>,
    metrics: Arc<AtomicMetrics>,
}

impl<D: EventDecoder> Dispatcher<D> {
    pub fn new(decoder: Arc<D>, bus: EventBus<D::Event>, metrics: Arc<AtomicMetrics>) -> Self {
        Self { decoder, bus, metrics }
    }

    /// Route one frame
    ///
    /// Frames that are not valid JSON go to the failure stream. A malformed
    /// control frame is a protocol violation and returns an error.
    pub fn route(&self, message: WsMessage, session: &mut Session) -> Result<Routed> {
        let raw = match message {
            WsMessage::Close(frame) => return Ok(Routed::Closed(frame)),
            WsMessage::Text(text) => text.into_bytes(),
            WsMessage::Binary(bytes) => bytes,
        };

        let frame = match GatewayPayload::from_slice(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Undecodable frame: {}", e);
                self.report(DecodeError::from(e), raw);
                return Ok(Routed::Ignored);
            }
        };

        trace!("<- {}", frame);

        match frame.op {
            OpCode::Dispatch => self.dispatch(frame, raw, session),
            OpCode::Hello => {
                let hello = frame.as_hello()?;
                if hello.heartbeat_interval == 0 {
                    return Err(GatewayError::Protocol("hello with zero heartbeat interval".into()));
                }
                Ok(Routed::Hello(Duration::from_millis(hello.heartbeat_interval)))
            }
            OpCode::HeartbeatAck => Ok(Routed::HeartbeatAck),
            OpCode::Heartbeat => Ok(Routed::HeartbeatRequest),
            OpCode::Reconnect => Ok(Routed::Reconnect),
            OpCode::InvalidSession => Ok(Routed::InvalidSession {
                resumable: frame.as_invalid_session()?,
            }),
            other => {
                debug!("Ignoring frame with op {}", other);
                Ok(Routed::Ignored)
            }
        }
    }

    fn dispatch(&self, frame: GatewayPayload, raw: Vec<u8>, session: &mut Session) -> Result<Routed> {
        if let Some(sequence) = frame.s {
            session.observe_sequence(sequence);
        }
        self.metrics.increment_dispatches();

        let control = match frame.t.as_deref() {
            Some("READY") => match serde_json::from_value::<Ready>(frame.d.clone()) {
                Ok(ready) => {
                    session.on_ready(&ready);
                    Ok(Routed::Ready)
                }
                Err(e) => Err(GatewayError::Protocol(format!("malformed READY: {e}"))),
            },
            Some("RESUMED") => Ok(Routed::Resumed),
            _ => Ok(Routed::Dispatched),
        };

        let decoded = self.decoder.decode(&RawDispatch {
            name: frame.t.as_deref(),
            sequence: frame.s,
            data: &frame.d,
            raw: &raw,
        });

        match decoded {
            Ok(event) => {
                self.bus.publish_event(event);
            }
            Err(error) => {
                debug!(event = ?frame.t, "Dispatch failed to decode: {}", error);
                self.report(error, raw);
            }
        }

        control
    }

    fn report(&self, error: DecodeError, raw: Vec<u8>) {
        self.metrics.increment_decode_failures();
        self.bus.publish_failure(DecodeFailure { error, raw });
    }
}
