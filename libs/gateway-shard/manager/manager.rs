use crate::config::ShardConfig;
use crate::connection_state::{AtomicMetrics, ConnectionPhase, Metrics, PhaseTracker, ShutdownSignal};
use crate::dispatcher::Dispatcher;
use crate::events::{EventBus, EventStream, FailureStream};
use crate::protocol::{GatewayPayload, RequestGuildMembers, UpdatePresence, VoiceStateUpdate};
use crate::rate_limiter::{CommandRateLimiter, RateBudget};
use crate::session::Session;
use crate::shard::{Shard, ShardCommand, ShardEvent, ShardHandles};
use crate::traits::{EventDecoder, GatewayError, Result};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

/// Lifecycle notifications buffered before new ones are dropped
const STATUS_CAPACITY: usize = 256;

/// Public entry point for one gateway connection
///
/// Owns the shard worker and exposes the operations callers need:
/// connect and disconnect, rate-limited commands, and the event and
/// decode-failure streams.
///
/// All methods take `&self`; share the manager behind an `Arc` to use it
/// from several tasks.
///
/// # Example
/// ```ignore
/// let manager = gateway_shard::builder()
///     .token(token)
///     .url("wss://gateway.discord.gg")
///     .build()?;
///
/// let mut events = manager.events();
/// manager.connect().await?;
///
/// while let Ok(event) = events.recv().await {
///     println!("{}", event.name);
/// }
/// ```
pub struct GatewayManager<D: EventDecoder> {
    config: Arc<ShardConfig>,
    decoder: Arc<D>,
    bus: EventBus<D::Event>,
    handles: ShardHandles,
    status_rx: Receiver<ShardEvent>,
    /// Sender for the current worker, replaced on every spawn
    command_tx: Mutex<Option<mpsc::UnboundedSender<ShardCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<D: EventDecoder> GatewayManager<D> {
    /// Called by the builder's `build()` method
    pub(crate) fn new(config: ShardConfig, decoder: D) -> Self {
        let (status_tx, status_rx) = crossbeam_channel::bounded(STATUS_CAPACITY);
        let handles = ShardHandles {
            phase: Arc::new(PhaseTracker::new(ConnectionPhase::Disconnected)),
            metrics: Arc::new(AtomicMetrics::new()),
            limiter: Arc::new(CommandRateLimiter::new(config.command_capacity, config.command_window)),
            shutdown: Arc::new(ShutdownSignal::new()),
            last_error: Arc::new(Mutex::new(None)),
            status_tx,
        };

        Self {
            bus: EventBus::new(config.stream_capacity),
            config: Arc::new(config),
            decoder: Arc::new(decoder),
            handles,
            status_rx,
            command_tx: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Connect and wait until the shard is ready
    ///
    /// Starts the worker unless one is already running; a second call while
    /// connecting simply waits for the same outcome. Transient failures are
    /// retried inside the worker, so this only returns an error when the
    /// shard stopped for good (fatal close, rejected identify, exhausted
    /// reconnection strategy) or the manager was disconnected.
    pub async fn connect(&self) -> Result<()> {
        if self.handles.shutdown.is_triggered() {
            return Err(GatewayError::Disconnected);
        }

        self.ensure_worker();

        let phase = self
            .handles
            .phase
            .wait_for(|phase| phase.is_ready() || phase.is_disconnected())
            .await;

        if phase.is_ready() {
            return Ok(());
        }
        if self.handles.shutdown.is_triggered() {
            return Err(GatewayError::Disconnected);
        }
        Err(self
            .handles
            .last_error
            .lock()
            .clone()
            .unwrap_or(GatewayError::Disconnected))
    }

    fn ensure_worker(&self) {
        let mut worker = self.worker.lock();
        // The worker publishes `Disconnected` as its last act, so any other
        // phase means it is still running
        if !self.handles.phase.get().is_disconnected() {
            debug!("Shard worker already running");
            return;
        }

        *self.handles.last_error.lock() = None;
        self.handles.phase.set(ConnectionPhase::Connecting);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        *self.command_tx.lock() = Some(command_tx);

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.decoder),
            self.bus.clone(),
            Arc::clone(&self.handles.metrics),
        );
        let shard = Shard::new(Arc::clone(&self.config), dispatcher, self.handles.clone(), command_rx);
        let span = info_span!("shard", shard_id = self.config.shard_id());

        info!(shard_id = self.config.shard_id(), "Starting shard worker");
        *worker = Some(tokio::spawn(shard.run().instrument(span)));
    }

    /// Stop the shard and wait for the worker to exit
    ///
    /// Idempotent. Callers blocked in [`connect`](Self::connect) or in a
    /// command send are released with [`GatewayError::Disconnected`]. The
    /// manager cannot be connected again afterwards.
    pub async fn disconnect(&self) {
        if !self.handles.shutdown.is_triggered() {
            info!(shard_id = self.config.shard_id(), "Disconnecting");
        }
        self.handles.shutdown.trigger();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Shard worker ended abnormally: {}", e);
            }
        }

        self.command_tx.lock().take();
        self.handles.phase.set(ConnectionPhase::Disconnected);
    }

    /// Update the bot's presence (op 3)
    pub async fn update_presence(&self, presence: UpdatePresence) -> Result<()> {
        self.send_command(GatewayPayload::presence_update(&presence)?).await
    }

    /// Join, move or leave a voice channel (op 4)
    pub async fn update_voice_state(&self, update: VoiceStateUpdate) -> Result<()> {
        self.send_command(GatewayPayload::voice_state_update(&update)?).await
    }

    /// Request guild member chunks (op 8)
    ///
    /// The members arrive later as `GUILD_MEMBERS_CHUNK` events.
    pub async fn request_guild_members(&self, request: RequestGuildMembers) -> Result<()> {
        self.send_command(GatewayPayload::request_guild_members(&request)?).await
    }

    async fn send_command(&self, payload: GatewayPayload) -> Result<()> {
        if self.handles.shutdown.is_triggered() {
            return Err(GatewayError::Disconnected);
        }
        let phase = self.phase();
        if !phase.is_ready() {
            return Err(GatewayError::NotConnected(phase.to_string()));
        }

        tokio::select! {
            acquired = self.handles.limiter.acquire(self.config.command_timeout) => acquired?,
            _ = self.handles.shutdown.wait() => return Err(GatewayError::Disconnected),
        }

        let command_tx = self
            .command_tx
            .lock()
            .clone()
            .ok_or(GatewayError::Disconnected)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        command_tx
            .send(ShardCommand::Send {
                payload,
                reply: reply_tx,
            })
            .map_err(|_| GatewayError::Disconnected)?;

        reply_rx.await.map_err(|_| GatewayError::Disconnected)?
    }

    /// Subscribe to decoded events
    ///
    /// Each call returns an independent subscriber that sees events
    /// published from now on.
    pub fn events(&self) -> EventStream<D::Event> {
        self.bus.subscribe_events()
    }

    /// Subscribe to dispatches that failed to decode
    pub fn failures(&self) -> FailureStream {
        self.bus.subscribe_failures()
    }

    /// Lifecycle notifications (connected, ready, reconnecting, ...)
    pub fn shard_events(&self) -> Receiver<ShardEvent> {
        self.status_rx.clone()
    }

    /// Try to receive a lifecycle notification (non-blocking)
    pub fn try_recv_shard_event(&self) -> Option<ShardEvent> {
        self.status_rx.try_recv().ok()
    }

    /// Current connection phase
    #[inline]
    pub fn phase(&self) -> ConnectionPhase {
        self.handles.phase.get()
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.phase().is_ready()
    }

    /// Wait until the shard reaches `phase`
    pub async fn wait_for_phase(&self, phase: ConnectionPhase) {
        self.handles.phase.wait_for(|current| *current == phase).await;
    }

    /// Snapshot of the session as the worker currently sees it
    pub async fn session(&self) -> Session {
        let command_tx = self.command_tx.lock().clone();
        let Some(command_tx) = command_tx else {
            return Session::default();
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if command_tx.send(ShardCommand::Session(reply_tx)).is_err() {
            return Session::default();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Metrics snapshot
    pub fn metrics(&self) -> Metrics {
        Metrics::snapshot(&self.handles.metrics, self.phase())
    }

    /// Remaining command budget
    pub fn rate_budget(&self) -> RateBudget {
        self.handles.limiter.budget()
    }

    pub fn config(&self) -> &ShardConfig {
        &self.config
    }
}

impl<D: EventDecoder> Drop for GatewayManager<D> {
    fn drop(&mut self) {
        self.handles.shutdown.trigger();
    }
}
