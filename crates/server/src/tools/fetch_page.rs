//! fetch_page tool implementation.
//!
//! Fetches a page through the resilient pipeline and returns its raw HTML.
//! Results are cached for five minutes.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use scrapegate_client::FetchRequest;
use scrapegate_core::{CacheOptions, Error, MAX_RETRIES_LIMIT, Payload, ResponseType};
use serde::{Deserialize, Serialize};

use super::tool_cache_key;
use crate::state::AppState;

/// Raw pages change often; keep them briefly.
pub const FETCH_PAGE_TTL_MINUTES: f64 = 5.0;

/// Input parameters for fetch_page tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FetchPageParams {
    /// The URL to fetch.
    pub url: String,

    /// Site identifier for health tracking (default: the URL's host).
    #[serde(default)]
    pub site: Option<String>,

    /// Raw `name=value; name2=value2` cookies sent on top of stored ones.
    #[serde(default)]
    pub cookies: Option<String>,

    /// Referer header (default: the URL's origin).
    #[serde(default)]
    pub referer: Option<String>,

    /// Retries after the first attempt (default: server config, max 10).
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Bypass the cache and overwrite any stored copy.
    #[serde(default)]
    pub force_refresh: bool,
}

impl FetchPageParams {
    fn cache_key(&self) -> String {
        let retries = self.max_retries.map(|r| r.to_string());
        tool_cache_key(
            "fetch_page",
            &[
                ("url", Some(self.url.as_str())),
                ("site", self.site.as_deref()),
                ("cookies", self.cookies.as_deref()),
                ("referer", self.referer.as_deref()),
                ("max_retries", retries.as_deref()),
            ],
        )
    }

    pub(crate) fn to_request(&self) -> FetchRequest {
        let mut request = FetchRequest::get(self.url.clone());
        if let Some(site) = &self.site {
            request = request.site(site.clone());
        }
        if let Some(cookies) = &self.cookies {
            request = request.cookies(cookies.clone());
        }
        if let Some(referer) = &self.referer {
            request = request.referer(referer.clone());
        }
        if let Some(retries) = self.max_retries {
            request = request.max_retries(retries);
        }
        request
    }
}

/// Implementation of the fetch_page tool.
pub async fn fetch_page_impl(state: &AppState, params: FetchPageParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }
    if let Some(retries) = params.max_retries
        && retries > MAX_RETRIES_LIMIT
    {
        let message = format!("max_retries must be at most {MAX_RETRIES_LIMIT}, got {retries}");
        return Err(Error::InvalidInput(message).into());
    }

    let key = params.cache_key();
    if params.force_refresh {
        state.cache.invalidate(&key).await;
    }

    let options = CacheOptions::from_minutes(Some(FETCH_PAGE_TTL_MINUTES), ResponseType::Text);
    let cached = state
        .cache
        .get_or_fetch(&key, &options, || async {
            let html = state.client.fetch_html(params.to_request()).await?;
            Ok::<_, Error>(Payload::text(html))
        })
        .await?;

    tracing::debug!(url = %params.url, hit = cached.hit, "fetch_page served");

    let body = match cached.payload {
        Payload::Text { body, .. } => body,
        Payload::Json(value) => value.to_string(),
    };

    Ok(CallToolResult::success(vec![Content::text(body)]))
}
