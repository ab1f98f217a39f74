//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Statuses worth another attempt: blocks, throttling, and transient server faults.
pub const RETRYABLE_STATUSES: [u16; 6] = [403, 429, 500, 502, 503, 504];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Delays between attempts.
///
/// Status failures back off harder than network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub status_base: Duration,
    pub status_jitter: Duration,
    pub network_base: Duration,
    pub network_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            status_base: Duration::from_millis(500),
            status_jitter: Duration::from_millis(250),
            network_base: Duration::from_millis(300),
            network_jitter: Duration::from_millis(150),
        }
    }
}

impl RetryPolicy {
    /// Sleep after attempt `attempt` failed with a retryable status.
    pub fn status_delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.status_base, self.status_jitter)
    }

    /// Sleep after attempt `attempt` failed with a timeout or connection error.
    pub fn network_delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.network_base, self.network_jitter)
    }
}

/// `base * 2^(attempt-1)` plus a uniform jitter in `0..=jitter`.
pub fn calculate_backoff(attempt: u32, base: Duration, jitter: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential = 2u32.saturating_pow(attempt - 1);
    let delay = base.saturating_mul(exponential);

    let jitter_ms = jitter.as_millis() as u64;
    let extra = if jitter_ms > 0 { rand::thread_rng().gen_range(0..=jitter_ms) } else { 0 };

    delay.saturating_add(Duration::from_millis(extra))
}
