//! Shared per-process fetch state.

use std::sync::Arc;

use scrapegate_core::AppConfig;

use super::cookies::CookieJar;
use super::headers::HeaderRotation;
use super::rate_limit::RateLimiter;
use crate::health::HealthMetrics;

/// State shared by every fetch issued through one [`super::FetchClient`].
///
/// Cloning is cheap and yields a handle to the same state.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    pub rate_limiter: Arc<RateLimiter>,
    pub cookies: Arc<CookieJar>,
    pub health: Arc<HealthMetrics>,
    pub headers: Arc<HeaderRotation>,
}

impl FetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose header pools come from `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        Self { headers: Arc::new(HeaderRotation::from_config(config)), ..Self::default() }
    }

    /// Clear rate buckets, cookies, and health for one host/site, or everything.
    pub fn reset(&self, host: Option<&str>) {
        self.rate_limiter.reset(host);
        self.cookies.clear(host);
        self.health.reset(host);
        tracing::info!(host = host.unwrap_or("*"), "fetch state reset");
    }
}
