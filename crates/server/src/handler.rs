//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the worker-backed tool implementations.
use crate::tools::{
    cache::{CacheGetParams, get_impl},
    client_open::open_impl,
    proxy_activate::activate_impl,
    proxy_fetch::{ProxyFetchParams, fetch_impl},
    proxy_status::status_impl,
};

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
use shellcache_client::ProxyWorker;
use std::sync::Arc;

/// The main MCP server handler for shellcache.
#[derive(Clone)]
pub struct ShellcacheServer {
    worker: Arc<ProxyWorker>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl ShellcacheServer {
    /// Create a new server handler around a started worker.
    pub fn new(worker: Arc<ProxyWorker>) -> Self {
        Self { worker, tool_router: Self::tool_router() }
    }

    /// Send a request through the caching proxy.
    #[tool(
        description = "Send a request through the offline caching proxy. Navigations are network-first with a cached shell fallback, static assets are stale-while-revalidate, and excluded paths go straight to the network."
    )]
    async fn proxy_fetch(&self, params: Parameters<ProxyFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    #[tool(description = "Activate the installed cache version, deleting every other version's store.")]
    async fn proxy_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.worker).await
    }

    #[tool(description = "Report the worker state, the current cache version and all stores with entry counts.")]
    async fn proxy_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.worker).await
    }

    /// Open a client context.
    ///
    /// Clients opened before activation are only routed through the proxy once claimed.
    #[tool(description = "Open a client context and return its id for use with proxy_fetch.")]
    async fn client_open(&self) -> Result<CallToolResult, McpError> {
        open_impl(&self.worker).await
    }

    #[tool(description = "Look up an entry in the active cache store by method and URL without using the network.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.worker, params.0).await
    }
}

impl ServerHandler for ShellcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "shellcache".into(),
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
