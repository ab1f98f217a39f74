//! MCP tool implementations.
//!
//! This module contains all tools exposed by the scrapegate server. Cacheable
//! tools key their entries as `/tools/<name>` plus the sorted, encoded
//! parameters, and only store results that carry `ok: true`.

pub mod cache_clear;
pub mod fetch_page;
pub mod resolve_urls;
pub mod reset_state;
pub mod scrape_page;
pub mod site_health;

pub use cache_clear::{CacheClearParams, cache_clear_impl};
pub use fetch_page::{FetchPageParams, fetch_page_impl};
pub use resolve_urls::{ResolveUrlsParams, resolve_urls_impl};
pub use reset_state::{ResetStateParams, reset_state_impl};
pub use scrape_page::{ScrapePageParams, scrape_page_impl};
pub use site_health::{SiteHealthParams, site_health_impl};

use rmcp::model::{CallToolResult, Content};
use scrapegate_core::{Error, cache::cache_key_from_pairs};
use serde::Serialize;
use url::form_urlencoded;

/// Cache key for a tool call; `None` parameters are left out.
pub fn tool_cache_key(tool: &str, params: &[(&str, Option<&str>)]) -> String {
    let pairs: Vec<(&str, String)> = params
        .iter()
        .filter_map(|(name, value)| value.map(|v| (*name, form_urlencoded::byte_serialize(v.as_bytes()).collect())))
        .collect();

    cache_key_from_pairs(&format!("/tools/{tool}"), &pairs)
}

/// Serialize `output` as the single text block of a successful result.
pub fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, Error> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
