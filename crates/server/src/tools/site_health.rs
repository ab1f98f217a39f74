//! site_health tool implementation.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use scrapegate_client::HealthSnapshot;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::state::AppState;

/// Input parameters for site_health tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SiteHealthParams {
    /// Site to report on; all sites when omitted.
    #[serde(default)]
    pub site: Option<String>,
}

/// Output structure for site_health tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteHealthOutput {
    pub ok: bool,
    /// Snapshots keyed by site. A requested site with no history is absent.
    pub sites: BTreeMap<String, HealthSnapshot>,
}

/// Implementation of the site_health tool.
pub async fn site_health_impl(state: &AppState, params: SiteHealthParams) -> Result<CallToolResult, McpError> {
    let health = &state.client.context().health;

    let sites = match params.site.as_deref() {
        Some(site) => health
            .get(site)
            .map(|snapshot| BTreeMap::from([(site.to_string(), snapshot)]))
            .unwrap_or_default(),
        None => health.get_all(),
    };

    json_result(&SiteHealthOutput { ok: true, sites }).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{json, state};
    use scrapegate_client::FailureReport;

    #[tokio::test]
    async fn test_reports_one_or_all() {
        let state = state();
        let health = &state.client.context().health;
        health.record_success("anime");
        health.record_failure("manga", FailureReport::new("status 503").status(503));

        let all = json(&site_health_impl(&state, SiteHealthParams::default()).await.unwrap());
        assert_eq!(all["ok"], true);
        assert_eq!(all["sites"]["anime"]["consecutive_failures"], 0);
        assert_eq!(all["sites"]["manga"]["last_error"]["status"], 503);

        let one = json(&site_health_impl(&state, SiteHealthParams { site: Some("manga".into()) }).await.unwrap());
        assert_eq!(one["sites"].as_object().unwrap().len(), 1);

        let none = json(&site_health_impl(&state, SiteHealthParams { site: Some("novel".into()) }).await.unwrap());
        assert!(none["sites"].as_object().unwrap().is_empty());
    }
}
