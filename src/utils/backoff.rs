use std::time::Duration;

use rand::Rng;

use crate::BackoffPolicy;

/// Tracks retry state for one reconnect sequence against a remote feed.
///
/// Delays grow exponentially from `base_delay_ms` up to `max_delay_ms`, with
/// ±25% jitter so that many routers recovering from the same outage do not
/// reconnect in lockstep. `reset()` must be called after a successful
/// connection so the next outage starts from the base delay again.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: usize,
    current_delay: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        let current_delay = Duration::from_millis(policy.base_delay_ms);
        Self {
            policy,
            attempt: 0,
            current_delay,
        }
    }

    /// Delay to sleep before the next attempt, or `None` once a bounded
    /// policy has exhausted its retries. `max_retries = 0` retries forever.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.policy.max_retries > 0 && self.attempt >= self.policy.max_retries {
            return None;
        }
        self.attempt += 1;

        let delay = self.jittered(self.current_delay);

        let doubled = self.current_delay.as_millis().saturating_mul(2) as u64;
        self.current_delay = Duration::from_millis(doubled.min(self.policy.max_delay_ms));

        Some(delay)
    }

    /// Restores the initial state after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_delay = Duration::from_millis(self.policy.base_delay_ms);
    }

    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.policy.timeout_ms)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis() as f64;
        let spread = ms * 0.25;
        if spread < 1.0 {
            return delay;
        }
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis((ms + offset).max(1.0) as u64)
    }
}
