//! filing_search tool implementation.
//!
//! Resolves filing descriptors from the search service.

use chrono::NaiveDate;
use filings_client::{QueryClient, SearchRequest};
use filings_core::{DocumentDescriptor, DocumentType, Error};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Input parameters for filing_search tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FilingSearchParams {
    /// Tickers (e.g. "AAPL") and/or CIKs (e.g. "320193").
    pub subjects: Vec<String>,

    /// Form type: 10-K, 10-Q or 8-K.
    #[serde(default)]
    pub document_type: Option<String>,

    /// Earliest filed-at date (YYYY-MM-DD), inclusive.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,

    /// Latest filed-at date (YYYY-MM-DD), inclusive.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,

    /// Number of results (1-50, default 10).
    #[serde(default)]
    pub size: Option<u8>,
}

/// Output structure for filing_search tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FilingSearchOutput {
    /// Matching filings, newest first.
    pub results: Vec<DocumentDescriptor>,
    /// Number of results returned.
    pub count: usize,
}

fn parse_document_type(value: Option<&str>) -> Result<Option<DocumentType>, Error> {
    value
        .map(|s| s.parse::<DocumentType>().map_err(Error::InvalidInput))
        .transpose()
}

/// Implementation of the filing_search tool.
pub async fn search_impl(query: &QueryClient, params: FilingSearchParams) -> Result<CallToolResult, McpError> {
    if params.subjects.iter().all(|s| s.trim().is_empty()) {
        return Err(Error::InvalidInput("subjects cannot be empty".into()).into());
    }

    let req = SearchRequest {
        subjects: params.subjects,
        document_type: parse_document_type(params.document_type.as_deref())?,
        start_date: params.start_date,
        end_date: params.end_date,
        size: params.size,
    };

    let results = query.search_request(&req).await.map_err(Error::from)?;
    let output = FilingSearchOutput { count: results.len(), results };

    json_result(&output)
}
