//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

/// Slowest accepted refill rate: one request every ~17 minutes.
pub const MIN_RPS: f64 = 0.001;

/// Most retries a single call may ask for; larger configured values only warn.
pub const MAX_RETRIES_LIMIT: u32 = 10;

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - either header pool is empty or holds a blank entry
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `default_rps` is below [`MIN_RPS`] or `default_burst` is below 1
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `cache_max_entries` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_agents.is_empty() || self.user_agents.iter().any(|ua| ua.trim().is_empty()) {
            return Err(invalid("user_agents", "must contain at least one non-empty entry"));
        }
        if self.accept_languages.is_empty() || self.accept_languages.iter().any(|l| l.trim().is_empty()) {
            return Err(invalid("accept_languages", "must contain at least one non-empty entry"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if !self.default_rps.is_finite() || self.default_rps < MIN_RPS {
            return Err(invalid("default_rps", "must be at least 0.001"));
        }
        if !self.default_burst.is_finite() || self.default_burst < 1.0 {
            return Err(invalid("default_burst", "must be at least 1"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.cache_max_entries == 0 {
            return Err(invalid("cache_max_entries", "must be greater than 0"));
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            tracing::warn!(
                max_retries = self.max_retries,
                "max_retries above 10 multiplies upstream load during outages"
            );
        }

        Ok(())
    }
}
