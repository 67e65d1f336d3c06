//! Shard worker
//!
//! One task per connection lifetime drives the whole state machine:
//!
//! ```text
//! Disconnected -> Connecting -> AwaitingHello -> Identifying -> Ready
//!                     ^               |              |          |
//!                     |               +--> Resuming -+          |
//!                     +------------ Reconnecting <--------------+
//! ```
//!
//! The worker exclusively owns the transport, the [`Session`] and the
//! heartbeat state. The manager talks to it through [`ShardCommand`]s and
//! observes it through the shared phase tracker, metrics and lifecycle
//! channel.

use crate::config::{connection_url, ShardConfig};
use crate::connection_state::{AtomicMetrics, ConnectionPhase, PhaseTracker, ShutdownSignal};
use crate::dispatcher::{Dispatcher, Routed};
use crate::error::{GatewayError, Result, TransportError};
use crate::heartbeat::{HeartbeatAction, HeartbeatController};
use crate::protocol::{CloseAction, CloseCode, GatewayPayload};
use crate::rate_limiter::CommandRateLimiter;
use crate::session::Session;
use crate::traits::{CloseFrame, EventDecoder, Transport, WsMessage};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

/// Close code that ends the session for good
const CLOSE_NORMAL: u16 = 1000;

/// Close code that keeps the session resumable
const CLOSE_RESUMABLE: u16 = 4000;

/// Upper bound for the closing handshake
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound for writing one frame; a socket that stalls longer is dead
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Random wait before identifying after an invalid session, in milliseconds
const INVALID_SESSION_DELAY_MS: std::ops::RangeInclusive<u64> = 1_000..=5_000;

/// Lifecycle notifications published by the shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardEvent {
    /// A transport was opened
    Connected,
    /// READY or RESUMED was received
    Ready { resumed: bool },
    /// Waiting before connection attempt `attempt`
    Reconnecting { attempt: usize },
    /// A transport was closed
    Disconnected,
    /// The shard stopped with an error
    Error(String),
}

/// Requests from the manager to the worker
#[derive(Debug)]
pub(crate) enum ShardCommand {
    /// Send a rate-limited command frame
    Send {
        payload: GatewayPayload,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Snapshot the session
    Session(oneshot::Sender<Session>),
}

/// State shared between the manager and its worker
#[derive(Debug, Clone)]
pub(crate) struct ShardHandles {
    pub(crate) phase: Arc<PhaseTracker>,
    pub(crate) metrics: Arc<AtomicMetrics>,
    pub(crate) limiter: Arc<CommandRateLimiter>,
    pub(crate) shutdown: Arc<ShutdownSignal>,
    pub(crate) last_error: Arc<Mutex<Option<GatewayError>>>,
    pub(crate) status_tx: Sender<ShardEvent>,
}

/// How a connection ended
#[derive(Debug)]
enum Outcome {
    Shutdown,
    Fatal(GatewayError),
    Reconnect {
        resumable: bool,
        retry_after: Option<Duration>,
    },
}

impl Outcome {
    fn reconnect(resumable: bool) -> Self {
        Outcome::Reconnect {
            resumable,
            retry_after: None,
        }
    }
}

/// `Err` ends the current connection
type Step = std::result::Result<(), Outcome>;

struct Connection {
    transport: Box<dyn Transport>,
    /// Pending delayed identify after an invalid session
    identify_at: Option<Instant>,
}

impl Connection {
    async fn close(&mut self, code: u16) {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.transport.close(code)).await {
            Ok(Ok(())) => debug!(code, "Connection closed"),
            Ok(Err(e)) => debug!("Error while closing connection: {}", e),
            Err(_) => debug!("Closing handshake timed out"),
        }
    }
}

pub(crate) struct Shard<D: EventDecoder> {
    config: Arc<ShardConfig>,
    dispatcher: Dispatcher<D>,
    handles: ShardHandles,
    commands: mpsc::UnboundedReceiver<ShardCommand>,
    session: Session,
    heartbeat: HeartbeatController,
    reconnect_attempt: usize,
    identify_rejections: u32,
}

impl<D: EventDecoder> Shard<D> {
    pub(crate) fn new(
        config: Arc<ShardConfig>,
        dispatcher: Dispatcher<D>,
        handles: ShardHandles,
        commands: mpsc::UnboundedReceiver<ShardCommand>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            handles,
            commands,
            session: Session::new(),
            heartbeat: HeartbeatController::new(),
            reconnect_attempt: 0,
            identify_rejections: 0,
        }
    }

    /// Run until shutdown or a fatal error
    pub(crate) async fn run(mut self) {
        let result = self.run_loop().await;
        self.heartbeat.stop();

        match &result {
            Ok(()) => info!("Shard stopped"),
            Err(e) => {
                error!("Shard stopped: {}", e);
                *self.handles.last_error.lock() = Some(e.clone());
                self.emit(ShardEvent::Error(e.to_string()));
            }
        }

        self.set_phase(ConnectionPhase::Disconnected);
    }

    async fn run_loop(&mut self) -> Result<()> {
        loop {
            if self.handles.shutdown.is_triggered() {
                return Ok(());
            }

            self.set_phase(ConnectionPhase::Connecting);

            let outcome = match self.open().await {
                Ok(transport) => {
                    info!("Connected");
                    self.emit(ShardEvent::Connected);
                    let outcome = self.drive(transport).await;
                    self.heartbeat.stop();
                    self.emit(ShardEvent::Disconnected);
                    outcome
                }
                Err(outcome) => outcome,
            };

            let (resumable, retry_after) = match outcome {
                Outcome::Shutdown => return Ok(()),
                Outcome::Fatal(e) => return Err(e),
                Outcome::Reconnect {
                    resumable,
                    retry_after,
                } => (resumable, retry_after),
            };

            if !resumable {
                debug!("Discarding session");
                self.session.clear();
            }

            if self.handles.shutdown.is_triggered() {
                return Ok(());
            }

            self.set_phase(ConnectionPhase::Reconnecting);

            let attempt = self.reconnect_attempt;
            let computed = match self.config.reconnect_strategy.next_delay(attempt) {
                Some(delay) => delay,
                None => {
                    return Err(GatewayError::ReconnectionFailed {
                        attempts: attempt,
                        reason: "reconnection strategy exhausted".into(),
                    })
                }
            };
            let delay = retry_after.unwrap_or(computed);

            self.reconnect_attempt += 1;
            self.handles.metrics.increment_reconnects();
            self.emit(ShardEvent::Reconnecting {
                attempt: self.reconnect_attempt,
            });
            info!(
                "Reconnecting in {:?} (attempt {}, resume: {})",
                delay,
                self.reconnect_attempt,
                self.session.can_resume()
            );

            if !self.idle(delay).await {
                return Ok(());
            }
        }
    }

    /// Resolve the URL and open a transport
    async fn open(&mut self) -> std::result::Result<Box<dyn Transport>, Outcome> {
        let shutdown = Arc::clone(&self.handles.shutdown);

        let (base, resuming) = match self.session.resume_url().filter(|_| self.session.can_resume()) {
            Some(url) => (url.to_string(), true),
            None => {
                let resolved = tokio::select! {
                    _ = shutdown.wait() => return Err(Outcome::Shutdown),
                    resolved = self.config.resolver.gateway_url() => resolved,
                };
                match resolved {
                    Ok(url) => (url, false),
                    Err(e) if e.is_fatal() => return Err(Outcome::Fatal(e)),
                    Err(e) => {
                        warn!("Failed to resolve gateway URL: {}", e);
                        self.emit(ShardEvent::Error(e.to_string()));
                        return Err(Outcome::reconnect(true));
                    }
                }
            }
        };

        let url = match connection_url(&base) {
            Ok(url) => url,
            Err(e) if resuming => {
                warn!("Unusable resume URL, starting a new session: {}", e);
                return Err(Outcome::reconnect(false));
            }
            Err(e) => return Err(Outcome::Fatal(e)),
        };
        debug!("Connecting to {}", url);

        let connect = tokio::time::timeout(self.config.connect_timeout, self.config.connector.connect(&url));
        let result = tokio::select! {
            _ = shutdown.wait() => return Err(Outcome::Shutdown),
            result = connect => result,
        };

        match result {
            Ok(Ok(transport)) => Ok(transport),
            Ok(Err(TransportError::RateLimited { retry_after })) => {
                warn!("Gateway rate limited the connection, retry after {:?}", retry_after);
                Err(Outcome::Reconnect {
                    resumable: true,
                    retry_after: Some(retry_after),
                })
            }
            Ok(Err(e)) => {
                warn!("Failed to connect: {}", e);
                self.emit(ShardEvent::Error(e.to_string()));
                Err(Outcome::reconnect(true))
            }
            Err(_) => {
                warn!("Connect timed out after {:?}", self.config.connect_timeout);
                Err(Outcome::reconnect(true))
            }
        }
    }

    /// Message loop for one open transport
    async fn drive(&mut self, transport: Box<dyn Transport>) -> Outcome {
        let mut conn = Connection {
            transport,
            identify_at: None,
        };
        let shutdown = Arc::clone(&self.handles.shutdown);

        self.set_phase(ConnectionPhase::AwaitingHello);

        loop {
            let identify_at = conn.identify_at;

            let step = tokio::select! {
                _ = shutdown.wait() => {
                    info!("Shutdown requested, closing connection");
                    self.set_phase(ConnectionPhase::ShuttingDown);
                    conn.close(CLOSE_NORMAL).await;
                    return Outcome::Shutdown;
                }

                frame = conn.transport.recv() => match frame {
                    Some(Ok(message)) => self.on_message(&mut conn, message).await,
                    Some(Err(e)) => {
                        warn!("Transport error: {}", e);
                        Err(Outcome::reconnect(true))
                    }
                    None => {
                        warn!("Gateway stream ended");
                        Err(Outcome::reconnect(true))
                    }
                },

                _ = self.heartbeat.next_tick() => self.on_heartbeat_tick(&mut conn).await,

                _ = sleep_until(identify_at.unwrap_or_else(Instant::now)), if identify_at.is_some() => {
                    conn.identify_at = None;
                    self.identify(&mut conn).await
                }

                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(&mut conn, command).await,
                    None => {
                        debug!("Manager dropped, closing connection");
                        conn.close(CLOSE_NORMAL).await;
                        return Outcome::Shutdown;
                    }
                },
            };

            if let Err(outcome) = step {
                return outcome;
            }
        }
    }

    async fn on_message(&mut self, conn: &mut Connection, message: WsMessage) -> Step {
        self.handles.metrics.increment_received();

        let routed = match self.dispatcher.route(message, &mut self.session) {
            Ok(routed) => routed,
            Err(e) => {
                warn!("{}, reconnecting", e);
                self.emit(ShardEvent::Error(e.to_string()));
                conn.close(CLOSE_RESUMABLE).await;
                return Err(Outcome::reconnect(true));
            }
        };

        match routed {
            Routed::Hello(interval) => self.on_hello(conn, interval).await,
            Routed::HeartbeatAck => {
                if let Some(latency) = self.heartbeat.on_ack() {
                    trace!(?latency, "Heartbeat acknowledged");
                    self.handles.metrics.record_latency(latency);
                }
                Ok(())
            }
            Routed::HeartbeatRequest => {
                debug!("Gateway requested a heartbeat");
                self.heartbeat.on_requested();
                self.send_heartbeat(conn).await
            }
            Routed::Ready => {
                self.on_ready(false);
                Ok(())
            }
            Routed::Resumed => {
                self.on_ready(true);
                Ok(())
            }
            Routed::Reconnect => {
                info!("Gateway requested a reconnect");
                conn.close(CLOSE_RESUMABLE).await;
                Err(Outcome::reconnect(true))
            }
            Routed::InvalidSession { resumable } => self.on_invalid_session(conn, resumable).await,
            Routed::Closed(frame) => Err(self.on_close(frame)),
            Routed::Dispatched | Routed::Ignored => Ok(()),
        }
    }

    async fn on_hello(&mut self, conn: &mut Connection, interval: Duration) -> Step {
        if self.phase() != ConnectionPhase::AwaitingHello {
            warn!("Unexpected hello in phase {}, reconnecting", self.phase());
            conn.close(CLOSE_RESUMABLE).await;
            return Err(Outcome::reconnect(true));
        }

        debug!(?interval, "Hello received");
        self.heartbeat.start(interval);

        if self.session.can_resume() {
            self.resume(conn).await
        } else {
            self.session.clear();
            self.identify(conn).await
        }
    }

    fn on_ready(&mut self, resumed: bool) {
        self.set_phase(ConnectionPhase::Ready);
        self.reconnect_attempt = 0;
        self.identify_rejections = 0;
        self.handles.limiter.reset();
        info!(
            session_id = self.session.session_id().unwrap_or_default(),
            sequence = ?self.session.sequence(),
            resumed,
            "Shard ready"
        );
        self.emit(ShardEvent::Ready { resumed });
    }

    async fn on_invalid_session(&mut self, conn: &mut Connection, resumable: bool) -> Step {
        let phase = self.phase();
        warn!(resumable, %phase, "Invalid session");

        match phase {
            ConnectionPhase::Resuming => {
                self.session.clear();
                self.schedule_identify(conn);
                Ok(())
            }
            _ if resumable && self.session.can_resume() => self.resume(conn).await,
            ConnectionPhase::Identifying if !resumable => {
                self.identify_rejections += 1;
                if self.identify_rejections >= self.config.max_identify_attempts {
                    conn.close(CLOSE_NORMAL).await;
                    return Err(Outcome::Fatal(GatewayError::IdentifyRejected {
                        attempts: self.identify_rejections,
                    }));
                }
                self.schedule_identify(conn);
                Ok(())
            }
            _ => {
                self.session.clear();
                self.schedule_identify(conn);
                Ok(())
            }
        }
    }

    fn schedule_identify(&mut self, conn: &mut Connection) {
        let delay = Duration::from_millis(rand::thread_rng().gen_range(INVALID_SESSION_DELAY_MS));
        debug!(?delay, "Identifying again after delay");
        self.set_phase(ConnectionPhase::Identifying);
        conn.identify_at = Some(Instant::now() + delay);
    }

    fn on_close(&mut self, frame: Option<CloseFrame>) -> Outcome {
        let Some(frame) = frame else {
            warn!("Gateway closed the connection without a code");
            return Outcome::reconnect(true);
        };

        let code = CloseCode::from_u16(frame.code);
        match code.action() {
            CloseAction::Fatal => {
                error!(reason = %frame.reason, "Gateway closed the connection: {}", code);
                let error = if code == CloseCode::AuthenticationFailed {
                    GatewayError::AuthenticationFailed(frame.reason)
                } else {
                    GatewayError::FatalClose {
                        code,
                        reason: frame.reason,
                    }
                };
                Outcome::Fatal(error)
            }
            CloseAction::Reidentify => {
                warn!(reason = %frame.reason, "Gateway closed the connection: {}, session discarded", code);
                Outcome::reconnect(false)
            }
            CloseAction::Resume => {
                warn!(reason = %frame.reason, "Gateway closed the connection: {}", code);
                Outcome::reconnect(true)
            }
        }
    }

    async fn on_heartbeat_tick(&mut self, conn: &mut Connection) -> Step {
        match self.heartbeat.on_tick() {
            HeartbeatAction::Send => self.send_heartbeat(conn).await,
            HeartbeatAction::Timeout => {
                warn!("Heartbeat was not acknowledged, reconnecting");
                conn.close(CLOSE_RESUMABLE).await;
                Err(Outcome::reconnect(true))
            }
        }
    }

    async fn on_command(&mut self, conn: &mut Connection, command: ShardCommand) -> Step {
        let (payload, reply) = match command {
            ShardCommand::Send { payload, reply } if self.phase().is_ready() => (payload, reply),
            other => {
                self.reject(other);
                return Ok(());
            }
        };

        let json = match payload.to_json() {
            Ok(json) => json,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return Ok(());
            }
        };

        let step = self.write(conn, WsMessage::Text(json), &payload).await;
        let _ = reply.send(match &step {
            Ok(()) => Ok(()),
            Err(Outcome::Shutdown) => Err(GatewayError::Disconnected),
            Err(_) => Err(GatewayError::ConnectionClosed(format!("{payload} was not delivered"))),
        });
        step
    }

    /// Answer a command that cannot reach the gateway right now
    fn reject(&self, command: ShardCommand) {
        match command {
            ShardCommand::Send { reply, .. } => {
                let _ = reply.send(Err(GatewayError::NotConnected(self.phase().to_string())));
            }
            ShardCommand::Session(reply) => {
                let _ = reply.send(self.session.clone());
            }
        }
    }

    async fn identify(&mut self, conn: &mut Connection) -> Step {
        self.set_phase(ConnectionPhase::Identifying);
        info!(intents = self.config.intents.bits(), "Identifying");
        let payload = GatewayPayload::identify(&self.config.identify()).map_err(Outcome::Fatal)?;
        self.send(conn, &payload).await
    }

    async fn resume(&mut self, conn: &mut Connection) -> Step {
        let Some(resume) = self.session.resume_payload(&self.config.token) else {
            return self.identify(conn).await;
        };
        self.set_phase(ConnectionPhase::Resuming);
        info!(session_id = %resume.session_id, seq = resume.seq, "Resuming session");
        let payload = GatewayPayload::resume(&resume).map_err(Outcome::Fatal)?;
        self.send(conn, &payload).await
    }

    async fn send_heartbeat(&mut self, conn: &mut Connection) -> Step {
        let payload = GatewayPayload::heartbeat(self.session.sequence());
        self.send(conn, &payload).await
    }

    /// Send a control frame; these bypass the command rate limiter
    async fn send(&mut self, conn: &mut Connection, payload: &GatewayPayload) -> Step {
        let json = payload.to_json().map_err(|e| Outcome::Fatal(e.into()))?;
        self.write(conn, WsMessage::Text(json), payload).await
    }

    /// Write one frame, giving up on shutdown or when the socket stalls
    async fn write(&mut self, conn: &mut Connection, message: WsMessage, payload: &GatewayPayload) -> Step {
        let shutdown = Arc::clone(&self.handles.shutdown);

        let written = tokio::select! {
            _ = shutdown.wait() => None,
            result = tokio::time::timeout(SEND_TIMEOUT, conn.transport.send(message)) => Some(result),
        };

        match written {
            Some(Ok(Ok(()))) => {
                trace!("-> {}", payload);
                self.handles.metrics.increment_sent();
                Ok(())
            }
            Some(Ok(Err(e))) => {
                warn!("Failed to send {}: {}", payload, e);
                Err(Outcome::reconnect(true))
            }
            Some(Err(_)) => {
                warn!("Sending {} stalled for {:?}, reconnecting", payload, SEND_TIMEOUT);
                conn.close(CLOSE_RESUMABLE).await;
                Err(Outcome::reconnect(true))
            }
            None => {
                info!("Shutdown requested while sending {}", payload);
                self.set_phase(ConnectionPhase::ShuttingDown);
                conn.close(CLOSE_NORMAL).await;
                Err(Outcome::Shutdown)
            }
        }
    }

    /// Wait out a backoff delay; `false` if shutdown interrupted it
    async fn idle(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let shutdown = Arc::clone(&self.handles.shutdown);

        loop {
            tokio::select! {
                _ = shutdown.wait() => return false,
                _ = sleep_until(deadline) => return true,
                command = self.commands.recv() => match command {
                    Some(command) => self.reject(command),
                    None => return false,
                },
            }
        }
    }

    #[inline]
    fn phase(&self) -> ConnectionPhase {
        self.handles.phase.get()
    }

    #[inline]
    fn set_phase(&self, phase: ConnectionPhase) {
        self.handles.phase.set(phase);
    }

    fn emit(&self, event: ShardEvent) {
        let _ = self.handles.status_tx.try_send(event);
    }
}
