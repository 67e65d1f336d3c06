//! Outbound command rate limiting
//!
//! The gateway closes connections that send more than a fixed number of
//! commands per rolling window. [`CommandRateLimiter`] keeps the timestamps
//! of the commands admitted in the current window and refills lazily when
//! the oldest one ages out; there is no background timer.
//!
//! Heartbeat, identify and resume never pass through the limiter.

use crate::error::{GatewayError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default commands allowed per window
pub const DEFAULT_COMMAND_CAPACITY: u32 = 110;

/// Default window length
pub const DEFAULT_COMMAND_WINDOW: Duration = Duration::from_secs(60);

/// Snapshot of the limiter budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    pub tokens: u32,
    pub capacity: u32,
    /// When the next token frees up; `None` while the budget is full
    pub refill_at: Option<Instant>,
}

#[derive(Debug)]
struct Admitted {
    at: VecDeque<Instant>,
}

impl Admitted {
    fn expire(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.at.front() {
            if now.duration_since(*oldest) >= window {
                self.at.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Debug)]
pub struct CommandRateLimiter {
    capacity: u32,
    window: Duration,
    admitted: Mutex<Admitted>,
}

impl CommandRateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            admitted: Mutex::new(Admitted {
                at: VecDeque::with_capacity(capacity as usize),
            }),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Take a token if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now()).is_ok()
    }

    /// On failure returns the instant the next token frees up
    fn try_acquire_at(&self, now: Instant) -> std::result::Result<(), Instant> {
        let mut admitted = self.admitted.lock();
        admitted.expire(now, self.window);
        if (admitted.at.len() as u32) < self.capacity {
            admitted.at.push_back(now);
            return Ok(());
        }
        Err(admitted.at.front().map_or(now, |oldest| *oldest + self.window))
    }

    /// Wait up to `timeout` for a token
    pub async fn acquire(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let refill_at = match self.try_acquire_at(Instant::now()) {
                Ok(()) => return Ok(()),
                Err(refill_at) => refill_at,
            };
            if refill_at > deadline {
                debug!(?timeout, "command budget exhausted");
                tokio::time::sleep_until(deadline).await;
                return Err(GatewayError::RateLimited(timeout));
            }
            tokio::time::sleep_until(refill_at).await;
        }
    }

    /// Restore the full budget
    pub fn reset(&self) {
        self.admitted.lock().at.clear();
    }

    pub fn budget(&self) -> RateBudget {
        let now = Instant::now();
        let mut admitted = self.admitted.lock();
        admitted.expire(now, self.window);
        let used = admitted.at.len() as u32;
        RateBudget {
            tokens: self.capacity.saturating_sub(used),
            capacity: self.capacity,
            refill_at: admitted.at.front().map(|oldest| *oldest + self.window),
        }
    }
}

impl Default for CommandRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_CAPACITY, DEFAULT_COMMAND_WINDOW)
    }
}
