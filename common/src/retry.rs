// Retry strategy with exponential backoff and jitter

use rand::Rng;
use std::time::Duration;

/// Retry strategy for failed job executions
pub trait RetryStrategy: Send + Sync {
    /// Delay before retrying after the given zero-based attempt
    fn delay(&self, attempt: u32) -> Duration;

    /// Number of retries allowed after the initial attempt
    fn max_retries(&self) -> u32;

    /// Delay for the next retry, or None when the budget is exhausted
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries() {
            return None;
        }
        Some(self.delay(attempt))
    }
}

/// Exponential backoff retry strategy with jitter
/// Sequence: 5s, 15s, 45s, ... (exponential growth, capped)
/// Jitter: random value added to prevent thundering herd
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay_secs: u64,
    max_delay_secs: u64,
    /// Jitter factor (0.0 to 1.0)
    jitter_factor: f64,
    max_retries: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_secs: 5,
            max_delay_secs: 1800, // 30 minutes
            jitter_factor: 0.1,   // 10% jitter
            max_retries: 3,
        }
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(
        base_delay_secs: u64,
        max_delay_secs: u64,
        jitter_factor: f64,
        max_retries: u32,
    ) -> Self {
        Self {
            base_delay_secs,
            max_delay_secs,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            max_retries,
        }
    }

    /// Calculate exponential delay without jitter
    fn calculate_base_delay(&self, attempt: u32) -> u64 {
        let delay = self
            .base_delay_secs
            .saturating_mul(3_u64.saturating_pow(attempt));
        delay.min(self.max_delay_secs)
    }

    /// Add random jitter, returning milliseconds
    fn add_jitter_ms(&self, base_delay_secs: u64) -> u64 {
        if self.jitter_factor == 0.0 {
            return base_delay_secs * 1000;
        }

        let mut rng = rand::thread_rng();
        let base_delay_ms = base_delay_secs * 1000;
        let jitter_range_ms = (base_delay_ms as f64 * self.jitter_factor) as u64;

        let jitter_ms = if jitter_range_ms > 0 {
            rng.gen_range(0..=jitter_range_ms)
        } else {
            0
        };

        base_delay_ms + jitter_ms
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let base_delay_secs = self.calculate_base_delay(attempt);
        Duration::from_millis(self.add_jitter_ms(base_delay_secs))
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Fixed delay retry strategy (for testing or simple cases)
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_retries: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_retries: u32) -> Self {
        Self { delay, max_retries }
    }
}

impl RetryStrategy for FixedDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
