use rand::Rng;
use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// Implement this trait to control how the shard should
/// behave when reconnecting after a disconnection.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the next reconnection attempt
    ///
    /// # Arguments
    /// * `attempt` - The reconnection attempt number (0-indexed, reset after every Ready)
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before reconnecting
    /// * `None` - Stop reconnecting
    fn next_delay(&self, attempt: usize) -> Option<Duration>;

    /// Check if we should continue reconnecting
    fn should_reconnect(&self, attempt: usize) -> bool;
}

/// Exponential backoff reconnection strategy
///
/// Delays between reconnection attempts grow exponentially:
/// initial_delay * 2^attempt, capped at max_delay. With jitter enabled the
/// computed delay is scaled down by a random fraction up to `jitter`, never
/// below `initial_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<usize>,
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy without jitter
    ///
    /// # Arguments
    /// * `initial_delay` - The initial delay before first reconnect
    /// * `max_delay` - The maximum delay between reconnects
    /// * `max_attempts` - Maximum number of attempts (None = unlimited)
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        max_attempts: Option<usize>,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
            jitter: 0.0,
        }
    }

    /// Enable jitter; `factor` is clamped to `[0, 1]`
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter = factor.clamp(0.0, 1.0);
        self
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for ExponentialBackoff {
    /// 1s doubling up to 60s, unlimited attempts, 50% jitter
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), None).with_jitter(0.5)
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_reconnect(attempt) {
            return None;
        }

        let factor = 2u64.saturating_pow(attempt.min(32) as u32);
        let delay = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        let capped = delay.min(self.max_delay.as_millis() as u64);

        if self.jitter <= 0.0 {
            return Some(Duration::from_millis(capped));
        }

        let scale = 1.0 - rand::thread_rng().gen_range(0.0..=self.jitter);
        let jittered = ((capped as f64) * scale) as u64;
        let floor = self.initial_delay.as_millis() as u64;
        Some(Duration::from_millis(jittered.max(floor.min(capped))))
    }

    fn should_reconnect(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

/// Fixed delay reconnection strategy
///
/// Always waits the same amount of time between reconnection attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
}

impl FixedDelay {
    /// Create a new fixed delay strategy
    ///
    /// # Arguments
    /// * `delay` - The fixed delay between reconnects
    /// * `max_attempts` - Maximum number of attempts (None = unlimited)
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self { delay, max_attempts }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_reconnect(attempt) {
            return None;
        }
        Some(self.delay)
    }

    fn should_reconnect(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

/// Never reconnect strategy
///
/// Any connection loss ends the manager with `ReconnectionFailed`
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _attempt: usize) -> Option<Duration> {
        None
    }

    fn should_reconnect(&self, _attempt: usize) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_within_bounds() {
        let strategy = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_secs(5),
            None,
        )
        .with_jitter(1.0);

        for attempt in 0..20 {
            let delay = strategy.next_delay(attempt).unwrap();
            assert!(delay >= Duration::from_millis(100), "attempt {attempt}: {delay:?}");
            assert!(delay <= Duration::from_secs(5), "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let strategy = ExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            None,
        );
        assert_eq!(strategy.next_delay(500), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_jitter_factor_is_clamped() {
        let strategy = ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(10),
            None,
        )
        .with_jitter(7.0);
        assert_eq!(strategy.next_delay(3), Some(Duration::from_millis(10)));
    }
}
