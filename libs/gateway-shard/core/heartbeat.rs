//! Heartbeat mechanism for gateway connections
//!
//! # Architecture
//!
//! A dedicated Tokio task only produces ticks. The shard worker owns the
//! [`HeartbeatState`] and decides on every tick whether to send a heartbeat
//! or declare the connection dead:
//!
//! ```text
//! ┌─────────────────────┐
//! │  Heartbeat Task     │
//! │  (Tokio spawn)      │
//! │                     │
//! │  first: interval*r  │
//! │  then every interval┼──> mpsc(1) ──> Shard worker ──> HeartbeatState
//! └─────────────────────┘                                    │
//!                                             Send / Timeout ┘
//! ```
//!
//! The first tick is delayed by a random fraction of the interval so many
//! shards started together do not heartbeat in lockstep.

use std::future::pending;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// What the worker must do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a heartbeat carrying the last sequence
    Send,
    /// The previous heartbeat was never acknowledged
    Timeout,
}

/// Per-connection heartbeat bookkeeping
#[derive(Debug, Clone)]
pub struct HeartbeatState {
    pub interval: Duration,
    pub last_sent_at: Option<Instant>,
    pub ack_pending: bool,
}

impl HeartbeatState {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent_at: None,
            ack_pending: false,
        }
    }

    /// Advance on a timer tick
    pub fn on_tick(&mut self) -> HeartbeatAction {
        if self.ack_pending {
            return HeartbeatAction::Timeout;
        }
        self.ack_pending = true;
        self.last_sent_at = Some(Instant::now());
        HeartbeatAction::Send
    }

    /// Record an out-of-band heartbeat requested by the server
    pub fn on_requested(&mut self) {
        self.last_sent_at = Some(Instant::now());
    }

    /// Clear the pending flag, returning the round trip when known
    pub fn on_ack(&mut self) -> Option<Duration> {
        self.ack_pending = false;
        self.last_sent_at.map(|sent| sent.elapsed())
    }
}

/// Tick producer loop
///
/// Ticks are dropped rather than queued when the worker has not consumed
/// the previous one yet.
pub async fn heartbeat_task(first_delay: Duration, interval: Duration, tick_tx: mpsc::Sender<()>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + first_delay, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(?interval, ?first_delay, "heartbeat task started");

    loop {
        ticker.tick().await;
        match tick_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => break,
        }
    }

    debug!("heartbeat task exiting");
}

/// Starts and stops the tick task and holds the worker-side state
#[derive(Debug, Default)]
pub struct HeartbeatController {
    state: Option<HeartbeatState>,
    ticks: Option<mpsc::Receiver<()>>,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin heartbeating with a randomly jittered first tick
    pub fn start(&mut self, interval: Duration) {
        let first_delay = interval.mul_f64(rand::random::<f64>());
        self.start_with_first_delay(interval, first_delay);
    }

    /// Begin heartbeating, replacing any running timer
    pub fn start_with_first_delay(&mut self, interval: Duration, first_delay: Duration) {
        self.stop();
        let (tick_tx, tick_rx) = mpsc::channel(1);
        self.task = Some(tokio::spawn(heartbeat_task(first_delay, interval, tick_tx)));
        self.ticks = Some(tick_rx);
        self.state = Some(HeartbeatState::new(interval));
    }

    /// Stop the timer; safe to call repeatedly
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.ticks = None;
        self.state = None;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn state(&self) -> Option<&HeartbeatState> {
        self.state.as_ref()
    }

    /// Wait for the next tick; pending forever while stopped
    ///
    /// Cancel safe.
    pub async fn next_tick(&mut self) {
        match self.ticks.as_mut() {
            Some(ticks) => {
                if ticks.recv().await.is_none() {
                    pending::<()>().await;
                }
            }
            None => pending::<()>().await,
        }
    }

    /// Handle a tick; a timeout also stops the timer
    pub fn on_tick(&mut self) -> HeartbeatAction {
        let action = match self.state.as_mut() {
            Some(state) => state.on_tick(),
            None => return HeartbeatAction::Send,
        };
        if action == HeartbeatAction::Timeout {
            self.stop();
        }
        action
    }

    pub fn on_requested(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.on_requested();
        }
    }

    pub fn on_ack(&mut self) -> Option<Duration> {
        self.state.as_mut().and_then(HeartbeatState::on_ack)
    }
}

impl Drop for HeartbeatController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_sends_then_times_out_without_ack() {
        let mut state = HeartbeatState::new(Duration::from_secs(1));
        assert_eq!(state.on_tick(), HeartbeatAction::Send);
        assert!(state.ack_pending);
        assert_eq!(state.on_tick(), HeartbeatAction::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_clears_pending_and_reports_latency() {
        let mut state = HeartbeatState::new(Duration::from_secs(1));
        assert_eq!(state.on_tick(), HeartbeatAction::Send);

        tokio::time::advance(Duration::from_millis(30)).await;
        let latency = state.on_ack().unwrap();
        assert_eq!(latency, Duration::from_millis(30));
        assert!(!state.ack_pending);

        assert_eq!(state.on_tick(), HeartbeatAction::Send);
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_ticks_on_interval() {
        let mut controller = HeartbeatController::new();
        controller.start_with_first_delay(Duration::from_millis(100), Duration::from_millis(10));

        let started = Instant::now();
        controller.next_tick().await;
        assert_eq!(started.elapsed(), Duration::from_millis(10));

        controller.next_tick().await;
        assert_eq!(started.elapsed(), Duration::from_millis(110));
    }

    #[tokio::test(start_paused = true)]
    async fn test_jittered_first_tick_within_interval() {
        let mut controller = HeartbeatController::new();
        controller.start(Duration::from_millis(500));

        let started = Instant::now();
        controller.next_tick().await;
        assert!(started.elapsed() <= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_stops_controller() {
        let mut controller = HeartbeatController::new();
        controller.start_with_first_delay(Duration::from_millis(100), Duration::ZERO);

        assert_eq!(controller.on_tick(), HeartbeatAction::Send);
        assert_eq!(controller.on_tick(), HeartbeatAction::Timeout);
        assert!(!controller.is_running());
        assert!(controller.state().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_silences_ticks() {
        let mut controller = HeartbeatController::new();
        controller.start_with_first_delay(Duration::from_millis(50), Duration::ZERO);
        controller.stop();
        controller.stop();

        let tick = tokio::time::timeout(Duration::from_secs(1), controller.next_tick()).await;
        assert!(tick.is_err());
    }
}
