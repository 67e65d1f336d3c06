//! Connection phase tracking, shutdown signalling and metrics
//!
//! The shard worker is the only writer of the phase; everyone else reads
//! snapshots or waits for a phase through a `watch` subscription.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Lifecycle phase of one gateway connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionPhase {
    Disconnected = 0,
    Connecting = 1,
    AwaitingHello = 2,
    Identifying = 3,
    Resuming = 4,
    Ready = 5,
    Reconnecting = 6,
    ShuttingDown = 7,
}

impl ConnectionPhase {
    /// Create from the raw discriminant
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disconnected),
            1 => Some(Self::Connecting),
            2 => Some(Self::AwaitingHello),
            3 => Some(Self::Identifying),
            4 => Some(Self::Resuming),
            5 => Some(Self::Ready),
            6 => Some(Self::Reconnecting),
            7 => Some(Self::ShuttingDown),
            _ => None,
        }
    }

    /// A transport is open (or being opened) for this phase
    pub fn is_connecting(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::AwaitingHello | Self::Identifying | Self::Resuming
        )
    }

    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }

    pub fn is_disconnected(self) -> bool {
        self == Self::Disconnected
    }
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::AwaitingHello => "AwaitingHello",
            Self::Identifying => "Identifying",
            Self::Resuming => "Resuming",
            Self::Ready => "Ready",
            Self::Reconnecting => "Reconnecting",
            Self::ShuttingDown => "ShuttingDown",
        };
        f.write_str(name)
    }
}

/// Shared view of the current phase
#[derive(Debug)]
pub struct PhaseTracker {
    tx: watch::Sender<ConnectionPhase>,
}

impl PhaseTracker {
    pub fn new(initial: ConnectionPhase) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Current phase
    #[inline]
    pub fn get(&self) -> ConnectionPhase {
        *self.tx.borrow()
    }

    /// Move to `phase`, waking waiters only when it actually changed
    pub fn set(&self, phase: ConnectionPhase) {
        self.tx.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            debug!(from = %current, to = %phase, "phase transition");
            *current = phase;
            true
        });
    }

    /// Subscribe to phase changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionPhase> {
        self.tx.subscribe()
    }

    /// Wait until the phase satisfies `predicate`, returning that phase
    pub async fn wait_for(&self, predicate: impl FnMut(&ConnectionPhase) -> bool) -> ConnectionPhase {
        let mut rx = self.tx.subscribe();
        let phase = match rx.wait_for(predicate).await {
            Ok(phase) => *phase,
            // The sender lives in `self`, so it cannot have been dropped.
            Err(_) => self.get(),
        };
        phase
    }
}

/// One-way shutdown flag that can be awaited
///
/// Once triggered it stays triggered; every current and future waiter
/// observes it.
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal has been triggered
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

const NO_LATENCY: u64 = u64::MAX;

/// Lock-free counters updated by the shard worker
#[derive(Debug)]
pub struct AtomicMetrics {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    dispatches: AtomicU64,
    decode_failures: AtomicU64,
    reconnect_count: AtomicU64,
    latency_ms: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            reconnect_count: AtomicU64::new(0),
            latency_ms: AtomicU64::new(NO_LATENCY),
        }
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_dispatches(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_decode_failures(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, latency: Duration) {
        let ms = latency.as_millis().min(u128::from(NO_LATENCY - 1)) as u64;
        self.latency_ms.store(ms, Ordering::Relaxed);
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    /// Round trip of the last acknowledged heartbeat
    pub fn latency(&self) -> Option<Duration> {
        match self.latency_ms.load(Ordering::Relaxed) {
            NO_LATENCY => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl Default for AtomicMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics snapshot
#[derive(Debug, Clone)]
pub struct Metrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub dispatches: u64,
    pub decode_failures: u64,
    pub reconnect_count: u64,
    pub latency: Option<Duration>,
    pub phase: ConnectionPhase,
}

impl Metrics {
    pub(crate) fn snapshot(metrics: &AtomicMetrics, phase: ConnectionPhase) -> Self {
        Self {
            frames_sent: metrics.frames_sent(),
            frames_received: metrics.frames_received(),
            dispatches: metrics.dispatches(),
            decode_failures: metrics.decode_failures(),
            reconnect_count: metrics.reconnect_count(),
            latency: metrics.latency(),
            phase,
        }
    }
}
