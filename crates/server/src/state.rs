//! Process-wide state shared by every tool call.

use scrapegate_client::{FetchClient, FetchConfig, FetchContext};
use scrapegate_core::{AppConfig, Error, ResponseCache};

/// Fetch client, response cache, and the config they were built from.
#[derive(Debug)]
pub struct AppState {
    pub config: AppConfig,
    pub client: FetchClient,
    pub cache: ResponseCache,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, Error> {
        let ctx = FetchContext::from_config(&config);
        let client = FetchClient::new(FetchConfig::from(&config), ctx)?;
        let cache = ResponseCache::new(config.cache_max_entries);

        tracing::info!(
            max_retries = config.max_retries,
            timeout_ms = config.timeout_ms,
            rps = config.default_rps,
            burst = config.default_burst,
            cache_max_entries = config.cache_max_entries,
            "state initialized"
        );

        Ok(Self { config, client, cache })
    }
}
