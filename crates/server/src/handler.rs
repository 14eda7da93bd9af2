//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::cache::purge::{CachePurgeParams, purge_impl};
use crate::tools::filing_batch_fetch::{FilingBatchFetchParams, batch_fetch_impl};
use crate::tools::filing_fetch::{FilingFetchParams, fetch_impl};
use crate::tools::filing_historical::{FilingHistoricalParams, historical_impl};
use crate::tools::filing_search::{FilingSearchParams, search_impl};

use filings_client::FilingPipeline;
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

/// The main MCP server handler for mcp-filings.
#[derive(Clone)]
pub struct McpFilingsServer {
    tool_router: ToolRouter<Self>,
    pipeline: Arc<FilingPipeline>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl McpFilingsServer {
    /// Create a new server handler over a shared pipeline.
    pub fn new(pipeline: Arc<FilingPipeline>) -> Self {
        Self { tool_router: Self::tool_router(), pipeline }
    }

    /// Search for filings by subject, form type and date range.
    #[tool(
        description = "Search SEC filings by ticker or CIK. Optional form type (10-K, 10-Q, 8-K), date range and size. Returns filing descriptors, newest first."
    )]
    async fn filing_search(&self, params: Parameters<FilingSearchParams>) -> Result<CallToolResult, McpError> {
        search_impl(self.pipeline.query(), params.0).await
    }

    /// Fetch one filing as a PDF.
    ///
    /// Accepts either an accession number or a descriptor from filing_search.
    /// Polling stops when the client cancels the request.
    #[tool(
        description = "Fetch one filing as a rendered PDF, by accession number or descriptor. Returns the local file path; cached filings are returned without a network request."
    )]
    async fn filing_fetch(
        &self, params: Parameters<FilingFetchParams>, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.pipeline, params.0, &context.ct).await
    }

    /// Fetch many filings concurrently.
    #[tool(
        description = "Fetch many filings concurrently under shared rate limits. One failed filing does not affect the others. Returns per-filing status and a summary."
    )]
    async fn filing_batch_fetch(
        &self, params: Parameters<FilingBatchFetchParams>, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let default_quality = self.pipeline.documents().default_quality();
        batch_fetch_impl(self.pipeline.batch(), default_quality, params.0, &context.ct).await
    }

    #[tool(
        description = "Fetch the latest annual report (10-K) and the four latest quarterly reports (10-Q) for a ticker or CIK."
    )]
    async fn filing_historical(
        &self, params: Parameters<FilingHistoricalParams>, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        historical_impl(&self.pipeline, params.0, &context.ct).await
    }

    /// Purge cached filings.
    #[tool(description = "Purge cached filings by subject (ticker or CIK) and/or age in days.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(self.pipeline.cache(), params.0).await
    }
}

impl ServerHandler for McpFilingsServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "mcp-filings".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Search SEC filings with filing_search, then fetch them as PDFs with filing_fetch or filing_batch_fetch."
                    .into(),
            ),
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
