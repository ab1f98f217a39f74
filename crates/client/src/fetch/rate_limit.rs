//! Per-host token bucket rate limiting.
//!
//! Each host gets a bucket holding up to `burst` tokens, refilled at `rps`
//! tokens per second. A caller that finds less than one token sleeps for the
//! time the deficit takes to refill, then re-reads the bucket. Waiters are not
//! queued, so there is no FIFO ordering between concurrent callers.

use std::time::Duration;

use dashmap::DashMap;
use scrapegate_core::MIN_RPS;
use tokio::time::Instant;

/// Default refill rate (one request every two seconds).
pub const DEFAULT_RPS: f64 = 0.5;

/// Default bucket capacity.
pub const DEFAULT_BURST: f64 = 2.0;

/// Upper bound on a single computed wait.
pub const MAX_WAIT: Duration = Duration::from_secs(60 * 60);

// Absorbs float drift after sleeping exactly the computed deficit.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct RateBucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateBucket {
    fn full(burst: f64, now: Instant) -> Self {
        Self { tokens: burst, last_refill: now }
    }

    /// Refill, then either take a token or report how long until one is available.
    fn try_acquire(&mut self, rps: f64, burst: f64, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rps).min(burst);
        self.last_refill = now;

        if self.tokens + EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            None
        } else {
            let wait = (1.0 - self.tokens) / rps;
            Some(Duration::try_from_secs_f64(wait).map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT)))
        }
    }
}

/// Per-host token buckets.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, RateBucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `host` may issue one more request.
    ///
    /// Non-positive or non-finite `rps`/`burst` fall back to the defaults;
    /// a positive `rps` below [`MIN_RPS`] is raised to it.
    pub async fn acquire(&self, host: &str, rps: f64, burst: f64) {
        let (rps, burst) = sanitize(rps, burst);

        loop {
            match self.try_acquire(host, rps, burst) {
                None => return,
                Some(wait) => {
                    tracing::debug!(host, wait_ms = wait.as_millis() as u64, "rate limited, waiting for token");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Take a token if one is available; otherwise return the wait needed.
    ///
    /// The bucket's shard lock is held only for the refill arithmetic.
    pub fn try_acquire(&self, host: &str, rps: f64, burst: f64) -> Option<Duration> {
        let (rps, burst) = sanitize(rps, burst);
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(host.to_string())
            .or_insert_with(|| RateBucket::full(burst, now));
        bucket.try_acquire(rps, burst, now)
    }

    /// Tokens left in `host`'s bucket as of its last refill.
    pub fn tokens(&self, host: &str) -> Option<f64> {
        self.buckets.get(host).map(|b| b.tokens)
    }

    /// Forget one host's bucket, or every bucket when `host` is `None`.
    pub fn reset(&self, host: Option<&str>) {
        match host {
            Some(host) => {
                self.buckets.remove(host);
            }
            None => self.buckets.clear(),
        }
        tracing::info!(host = host.unwrap_or("*"), "rate limiter reset");
    }
}

fn sanitize(rps: f64, burst: f64) -> (f64, f64) {
    let rps = if rps.is_finite() && rps > 0.0 { rps.max(MIN_RPS) } else { DEFAULT_RPS };
    let burst = if burst.is_finite() && burst >= 1.0 { burst } else { DEFAULT_BURST };
    (rps, burst)
}
