//! Browser-like request headers with per-host User-Agent rotation.

use dashmap::DashMap;
use reqwest::header::{ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER, USER_AGENT};
use scrapegate_core::{AppConfig, Error};

/// Static headers sent with every request unless the caller overrides them.
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"),
    ("accept-encoding", "gzip, deflate, br"),
    ("connection", "keep-alive"),
    ("upgrade-insecure-requests", "1"),
];

/// Rotating User-Agent and Accept-Language pools.
#[derive(Debug)]
pub struct HeaderRotation {
    user_agents: Vec<String>,
    accept_languages: Vec<String>,
    cursors: DashMap<String, usize>,
}

impl Default for HeaderRotation {
    fn default() -> Self {
        let config = AppConfig::default();
        Self::new(config.user_agents, config.accept_languages)
    }
}

impl HeaderRotation {
    /// Create a rotation over the given pools; an empty pool falls back to the defaults.
    pub fn new(user_agents: Vec<String>, accept_languages: Vec<String>) -> Self {
        let defaults = AppConfig::default();
        let user_agents = if user_agents.is_empty() { defaults.user_agents } else { user_agents };
        let accept_languages = if accept_languages.is_empty() { defaults.accept_languages } else { accept_languages };

        Self { user_agents, accept_languages, cursors: DashMap::new() }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.user_agents.clone(), config.accept_languages.clone())
    }

    /// Next User-Agent for `host`, round-robin across the pool.
    pub fn next_user_agent(&self, host: &str) -> &str {
        let mut cursor = self.cursors.entry(host.to_string()).or_insert(0);
        let index = *cursor % self.user_agents.len();
        *cursor = cursor.wrapping_add(1);
        &self.user_agents[index]
    }

    /// Accept-Language for a 1-based attempt number.
    pub fn accept_language(&self, attempt: u32) -> &str {
        &self.accept_languages[attempt as usize % self.accept_languages.len()]
    }

    pub fn user_agents(&self) -> &[String] {
        &self.user_agents
    }

    /// Build the full header set for one attempt.
    ///
    /// Precedence, lowest to highest: static defaults, rotated headers and
    /// referer, caller headers, then the jar's `Cookie` header.
    pub fn build(
        &self, host: &str, attempt: u32, referer: &str, caller: &[(String, String)], cookie: Option<String>,
    ) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();

        for &(name, value) in DEFAULT_HEADERS {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }

        headers.insert(USER_AGENT, header_value(self.next_user_agent(host))?);
        headers.insert(ACCEPT_LANGUAGE, header_value(self.accept_language(attempt))?);
        headers.insert(REFERER, header_value(referer)?);

        for (name, value) in caller {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidInput(format!("invalid header name {name:?}: {e}")))?;
            headers.insert(name, header_value(value)?);
        }

        if let Some(cookie) = cookie {
            headers.insert(COOKIE, header_value(&cookie)?);
        }

        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|e| Error::InvalidInput(format!("invalid header value: {e}")))
}
