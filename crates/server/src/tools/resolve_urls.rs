//! resolve_urls tool implementation.
//!
//! Resolves one redirect hop for each URL in a batch. Failures come back as
//! empty strings in place; the batch itself never fails on a bad URL.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use scrapegate_core::{Error, MAX_RETRIES_LIMIT};
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::state::AppState;

/// Largest batch accepted in one call.
pub const MAX_URLS: usize = 50;

/// Input parameters for resolve_urls tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResolveUrlsParams {
    /// URLs to resolve (max 50).
    pub urls: Vec<String>,

    /// Referer header sent with every redirect lookup (default: each URL's origin).
    #[serde(default)]
    pub referer: Option<String>,

    /// Extra tries per URL after the first (default: 1, max 10).
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_retries() -> u32 {
    1
}

/// Output structure for resolve_urls tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResolveUrlsOutput {
    pub ok: bool,
    /// Final URLs in input order; empty where resolution failed.
    pub resolved: Vec<String>,
    /// Number of URLs that could not be resolved.
    pub failed: usize,
}

/// Implementation of the resolve_urls tool.
pub async fn resolve_urls_impl(state: &AppState, params: ResolveUrlsParams) -> Result<CallToolResult, McpError> {
    if params.urls.is_empty() {
        return Err(Error::InvalidInput("urls cannot be empty".into()).into());
    }
    if params.urls.len() > MAX_URLS {
        return Err(Error::InvalidInput(format!("at most {MAX_URLS} urls per call, got {}", params.urls.len())).into());
    }
    if params.retries > MAX_RETRIES_LIMIT {
        return Err(
            Error::InvalidInput(format!("retries must be at most {MAX_RETRIES_LIMIT}, got {}", params.retries)).into()
        );
    }

    let resolved = state
        .client
        .get_final_urls(&params.urls, params.referer.as_deref(), params.retries)
        .await;
    let failed = resolved.iter().filter(|u| u.is_empty()).count();

    tracing::info!(total = resolved.len(), failed, "resolved redirect batch");

    json_result(&ResolveUrlsOutput { ok: true, resolved, failed }).map_err(Into::into)
}
