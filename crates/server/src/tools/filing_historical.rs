//! filing_historical tool implementation.
//!
//! Resolves the latest annual report and the four latest quarterly reports
//! for one subject and fetches them all.

use filings_client::{CancellationToken, FilingPipeline};
use filings_core::DocumentDescriptor;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::tools::filing_batch_fetch::FilingBatchFetchOutput;
use crate::tools::json_result;

/// Input parameters for filing_historical tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FilingHistoricalParams {
    /// Ticker (e.g. "AAPL") or CIK (e.g. "320193").
    pub subject: String,
}

/// Output structure for filing_historical tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FilingHistoricalOutput {
    pub subject: String,
    /// Filings that were resolved, annual report first.
    pub descriptors: Vec<DocumentDescriptor>,
    /// Per-filing fetch outcomes.
    #[serde(flatten)]
    pub fetch: FilingBatchFetchOutput,
}

/// Implementation of the filing_historical tool.
pub async fn historical_impl(
    pipeline: &FilingPipeline, params: FilingHistoricalParams, cancel: &CancellationToken,
) -> Result<CallToolResult, McpError> {
    let subject = params.subject.trim();
    if subject.is_empty() {
        return Err(ToolError::InvalidInput("subject cannot be empty".into()).into());
    }

    let historical = pipeline.fetch_historical(subject, cancel).await?;
    let output = FilingHistoricalOutput {
        subject: subject.to_uppercase(),
        fetch: FilingBatchFetchOutput::from(&historical.report),
        descriptors: historical.descriptors,
    };

    json_result(&output)
}
