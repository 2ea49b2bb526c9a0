//! Exponential backoff with jitter for failed deliveries.

use std::time::Duration;

use rand::Rng;

/// Retry schedule: `base * 2^(attempt-1)`, capped, plus up to 10% jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound on the pre-jitter delay.
    pub max_delay: Duration,
    /// Total attempt budget (initial attempt included).
    pub max_attempts: u32,
    /// Jitter fraction added on top of the computed delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
            max_attempts: 5,
            jitter: 0.10,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Whether another attempt may follow the given (1-based) attempt.
    #[must_use]
    pub fn attempts_remaining(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Pre-jitter delay after the given failed attempt.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }

    /// Backoff plus random jitter in `[0, jitter * backoff)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let jitter = base.mul_f64(rand::thread_rng().gen::<f64>() * self.jitter);
        base + jitter
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
