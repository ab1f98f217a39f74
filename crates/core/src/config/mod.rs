//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SCRAPEGATE_*)
//! 2. TOML config file (if SCRAPEGATE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::{ConfigError, MAX_RETRIES_LIMIT, MIN_RPS};

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SCRAPEGATE_*)
/// 2. TOML config file (if SCRAPEGATE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// User-Agent pool rotated round-robin per host.
    ///
    /// Set via SCRAPEGATE_USER_AGENTS (TOML array or `["a","b"]` in env).
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,

    /// Accept-Language pool, indexed by attempt number.
    #[serde(default = "default_accept_languages")]
    pub accept_languages: Vec<String>,

    /// Per-attempt HTTP timeout in milliseconds.
    ///
    /// Set via SCRAPEGATE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt.
    ///
    /// Set via SCRAPEGATE_MAX_RETRIES environment variable.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Token refill rate per host, in requests per second.
    #[serde(default = "default_rps")]
    pub default_rps: f64,

    /// Token bucket capacity per host.
    #[serde(default = "default_burst")]
    pub default_burst: f64,

    /// Maximum bytes to read per response.
    ///
    /// Set via SCRAPEGATE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Maximum number of redirects followed by ordinary fetches.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Maximum number of cached responses kept in memory.
    ///
    /// Set via SCRAPEGATE_CACHE_MAX_ENTRIES environment variable.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: u64,
}

fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".into(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15".into(),
        "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0".into(),
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0".into(),
    ]
}

fn default_accept_languages() -> Vec<String> {
    vec!["en-US,en;q=0.9".into(), "en-GB,en;q=0.8".into(), "en;q=0.7".into()]
}

fn default_timeout_ms() -> u64 {
    25_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_rps() -> f64 {
    0.5
}

fn default_burst() -> f64 {
    2.0
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_max_redirects() -> usize {
    5
}

fn default_cache_max_entries() -> u64 {
    500
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agents: default_user_agents(),
            accept_languages: default_accept_languages(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            default_rps: default_rps(),
            default_burst: default_burst(),
            max_bytes: default_max_bytes(),
            max_redirects: default_max_redirects(),
            cache_max_entries: default_cache_max_entries(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SCRAPEGATE_`
    /// 2. TOML file from `SCRAPEGATE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// The layered provider stack used by [`AppConfig::load`].
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SCRAPEGATE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("SCRAPEGATE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }

    /// Extract and validate a configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.timeout_ms, 25_000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.default_rps, 0.5);
        assert_eq!(config.default_burst, 2.0);
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.cache_max_entries, 500);
        assert_eq!(config.user_agents.len(), 4);
        assert_eq!(config.accept_languages.len(), 3);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(25_000));
    }

    #[test]
    fn test_load_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("scrapegate.toml", "timeout_ms = 9000\nmax_retries = 1\n")?;
            jail.set_env("SCRAPEGATE_CONFIG_FILE", "scrapegate.toml");
            jail.set_env("SCRAPEGATE_MAX_RETRIES", "5");

            let config = AppConfig::load().expect("config loads");
            assert_eq!(config.timeout_ms, 9000);
            assert_eq!(config.max_retries, 5);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        Jail::expect_with(|jail| {
            jail.set_env("SCRAPEGATE_DEFAULT_RPS", "0");
            let result = AppConfig::load();
            assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "default_rps"));

            jail.set_env("SCRAPEGATE_DEFAULT_RPS", "1e-20");
            let result = AppConfig::load();
            assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "default_rps"));
            Ok(())
        });
    }
}
