//! cache_clear tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::state::AppState;

/// Parameters for the cache_clear tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearParams {
    /// Drop only this cache key (as reported in logs); everything when omitted.
    #[serde(default)]
    pub key: Option<String>,
}

/// Output from the cache_clear tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearOutput {
    pub ok: bool,
    /// Entries held before clearing.
    pub cleared: u64,
}

/// Implementation of the cache_clear tool.
pub async fn cache_clear_impl(state: &AppState, params: CacheClearParams) -> Result<CallToolResult, McpError> {
    state.cache.sync().await;
    let before = state.cache.entry_count();

    match params.key.as_deref() {
        Some(key) => state.cache.invalidate(key).await,
        None => state.cache.clear().await,
    }

    state.cache.sync().await;
    let cleared = before.saturating_sub(state.cache.entry_count());
    tracing::info!(cleared, "response cache cleared");

    json_result(&CacheClearOutput { ok: true, cleared }).map_err(Into::into)
}
