//! MCP tool implementations.
//!
//! This module contains all tools exposed by the mcp-filings server.

pub mod cache;
pub mod filing_batch_fetch;
pub mod filing_fetch;
pub mod filing_historical;
pub mod filing_search;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use crate::error::ToolError;

/// Encode a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(|e| ToolError::Output(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::sync::Arc;

    use filings_client::{FilingPipeline, HttpReply, HttpRequest, Transport, TransportError};
    use filings_core::AppConfig;
    use rmcp::model::CallToolResult;

    type Handler = Box<dyn Fn(&HttpRequest) -> Result<HttpReply, TransportError> + Send + Sync>;

    /// Answers every request through a closure.
    pub struct StubTransport(Handler);

    #[async_trait::async_trait]
    impl Transport for StubTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
            (self.0)(&request)
        }
    }

    /// Search hits for AAPL, and PDF bytes for every render request.
    pub fn default_handler(request: &HttpRequest) -> Result<HttpReply, TransportError> {
        if request.method.as_str() == "POST" {
            let query = request.json.as_ref().and_then(|j| j["query"].as_str()).unwrap_or_default();
            let (form, accession, filed_at) = if query.contains("10-Q") {
                ("10-Q", "0000320193-23-000077", "2023-08-04T18:03:14-04:00")
            } else {
                ("10-K", "0000320193-23-000106", "2023-11-02T18:01:14-04:00")
            };
            let body = serde_json::json!({
                "filings": [{
                    "accessionNo": accession,
                    "formType": form,
                    "filedAt": filed_at,
                    "ticker": "AAPL",
                    "companyName": "Apple Inc.",
                    "linkToHtml": "https://www.sec.gov/Archives/edgar/data/320193/000032019323000106/aapl-20230930.htm"
                }]
            });
            Ok(HttpReply::new(200, body.to_string()))
        } else if request.query_value("url").is_some_and(|u| u.contains("missing")) {
            Ok(HttpReply::new(404, ""))
        } else {
            Ok(HttpReply::new(200, "%PDF-1.7"))
        }
    }

    pub fn config(root: &Path) -> AppConfig {
        AppConfig { api_key: Some("test-token".into()), cache_dir: root.to_path_buf(), ..Default::default() }
    }

    pub async fn pipeline(root: &Path) -> Arc<FilingPipeline> {
        let transport = Arc::new(StubTransport(Box::new(default_handler)));
        Arc::new(FilingPipeline::with_transport(config(root), transport).await.unwrap())
    }

    /// Decode the JSON text of a tool result.
    pub fn output<T: serde::de::DeserializeOwned>(result: &CallToolResult) -> T {
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}
