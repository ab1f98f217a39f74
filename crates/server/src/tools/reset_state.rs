//! reset_state tool implementation.
//!
//! Operational recovery: drops rate buckets, cookies, and health records for
//! one host (or everything), e.g. after a site stops blocking.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::state::AppState;

/// Input parameters for reset_state tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ResetStateParams {
    /// Host key (`host[:port]`) or site to reset; everything when omitted.
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResetStateOutput {
    pub ok: bool,
    /// The host that was reset, or `*`.
    pub reset: String,
}

/// Implementation of the reset_state tool.
pub async fn reset_state_impl(state: &AppState, params: ResetStateParams) -> Result<CallToolResult, McpError> {
    let host = params.host.as_deref().map(str::trim).filter(|h| !h.is_empty());
    state.client.context().reset(host);

    json_result(&ResetStateOutput { ok: true, reset: host.unwrap_or("*").to_string() }).map_err(Into::into)
}
