//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::state::AppState;
use crate::tools::{
    CacheClearParams, FetchPageParams, ResetStateParams, ResolveUrlsParams, ScrapePageParams, SiteHealthParams,
    cache_clear_impl, fetch_page_impl, reset_state_impl, resolve_urls_impl, scrape_page_impl, site_health_impl,
};

/// The main MCP server handler for scrapegate.
#[derive(Clone)]
pub struct ScrapegateServer {
    state: Arc<AppState>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl ScrapegateServer {
    /// Create a new server handler over shared state.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Fetch a page with rate limiting, browser-like headers, persisted cookies, and retries. Returns raw HTML; cached for 5 minutes."
    )]
    async fn fetch_page(&self, params: Parameters<FetchPageParams>) -> Result<CallToolResult, McpError> {
        fetch_page_impl(&self.state, params.0).await
    }

    #[tool(
        description = "Fetch a page and extract named fields with a versioned CSS selector set. Returns a JSON record; cached for 10 minutes. Fails with SELECTOR_MISSING when the page layout changed."
    )]
    async fn scrape_page(&self, params: Parameters<ScrapePageParams>) -> Result<CallToolResult, McpError> {
        scrape_page_impl(&self.state, params.0).await
    }

    #[tool(
        description = "Resolve one redirect hop for each URL. Output order matches input; unresolvable URLs become empty strings."
    )]
    async fn resolve_urls(&self, params: Parameters<ResolveUrlsParams>) -> Result<CallToolResult, McpError> {
        resolve_urls_impl(&self.state, params.0).await
    }

    #[tool(description = "Report per-site health: last success, last error, and consecutive failures.")]
    async fn site_health(&self, params: Parameters<SiteHealthParams>) -> Result<CallToolResult, McpError> {
        site_health_impl(&self.state, params.0).await
    }

    #[tool(description = "Reset rate limits, cookies, and health records for one host, or for every host.")]
    async fn reset_state(&self, params: Parameters<ResetStateParams>) -> Result<CallToolResult, McpError> {
        reset_state_impl(&self.state, params.0).await
    }

    #[tool(description = "Drop one cached response by key, or the whole response cache.")]
    async fn cache_clear(&self, params: Parameters<CacheClearParams>) -> Result<CallToolResult, McpError> {
        cache_clear_impl(&self.state, params.0).await
    }
}

impl ServerHandler for ScrapegateServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "scrapegate".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
