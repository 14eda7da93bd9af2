//! filing_batch_fetch tool implementation.
//!
//! Fetches many filings concurrently under the shared rate limits.

use filings_client::{BatchDownloader, BatchReport, CancellationToken};
use filings_core::{DocumentDescriptor, RenderQuality};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::tools::json_result;

/// Largest batch accepted in one call.
const MAX_BATCH: usize = 100;

/// Input parameters for filing_batch_fetch tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FilingBatchFetchParams {
    /// Descriptors previously returned by filing_search.
    pub descriptors: Vec<DocumentDescriptor>,

    /// Render quality: low, medium or high (server default when omitted).
    #[serde(default)]
    pub quality: Option<RenderQuality>,
}

/// Batch item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum BatchItemStatus {
    /// Fetched from the render service.
    Fetched,
    /// Returned from cache.
    Cached,
    /// Failed to fetch.
    Failed,
}

/// Individual batch result item.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchItem {
    /// Descriptor id.
    pub id: String,
    /// Status of this item.
    pub status: BatchItemStatus,
    /// Local path of the PDF (if fetched or cached).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Machine-readable failure class (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Error message (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Batch summary statistics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchSummary {
    /// Number of distinct descriptors processed.
    pub total: usize,
    /// Number fetched from the render service.
    pub fetched: usize,
    /// Number returned from cache.
    pub cached: usize,
    /// Number of failures.
    pub failed: usize,
}

/// Output structure for filing_batch_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FilingBatchFetchOutput {
    /// One entry per distinct descriptor id, ordered by id.
    pub results: Vec<BatchItem>,
    /// Summary statistics.
    pub summary: BatchSummary,
}

impl From<&BatchReport> for FilingBatchFetchOutput {
    fn from(report: &BatchReport) -> Self {
        let results: Vec<BatchItem> = report
            .results
            .iter()
            .map(|(id, result)| match result {
                Ok(doc) => BatchItem {
                    id: id.clone(),
                    status: if doc.from_cache { BatchItemStatus::Cached } else { BatchItemStatus::Fetched },
                    path: Some(doc.path.display().to_string()),
                    size_bytes: Some(doc.size_bytes),
                    error_code: None,
                    error: None,
                },
                Err(e) => BatchItem {
                    id: id.clone(),
                    status: BatchItemStatus::Failed,
                    path: None,
                    size_bytes: None,
                    error_code: Some(e.code().to_string()),
                    error: Some(e.to_string()),
                },
            })
            .collect();

        let count = |status| results.iter().filter(|item| item.status == status).count();
        let summary = BatchSummary {
            total: results.len(),
            fetched: count(BatchItemStatus::Fetched),
            cached: count(BatchItemStatus::Cached),
            failed: count(BatchItemStatus::Failed),
        };

        Self { results, summary }
    }
}

/// Implementation of the filing_batch_fetch tool.
///
/// Items still running when `cancel` fires are reported as failed with `CANCELLED`.
pub async fn batch_fetch_impl(
    batch: &BatchDownloader, default_quality: RenderQuality, params: FilingBatchFetchParams,
    cancel: &CancellationToken,
) -> Result<CallToolResult, McpError> {
    if params.descriptors.is_empty() {
        return Err(ToolError::InvalidInput("descriptors cannot be empty".into()).into());
    }
    if params.descriptors.len() > MAX_BATCH {
        return Err(ToolError::InvalidInput(format!(
            "too many descriptors: {} (max {MAX_BATCH})",
            params.descriptors.len()
        ))
        .into());
    }

    let quality = params.quality.unwrap_or(default_quality);
    let report = batch
        .fetch_all_with_cancel(&params.descriptors, quality, cancel)
        .await;

    json_result(&FilingBatchFetchOutput::from(&report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{output, pipeline};
    use chrono::NaiveDate;
    use filings_core::DocumentType;

    fn descriptor(id: &str, day: u32, file: &str) -> DocumentDescriptor {
        DocumentDescriptor::new(
            id,
            "NVDA",
            DocumentType::EventReport,
            NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            format!("https://www.sec.gov/Archives/edgar/data/1045810/{file}"),
        )
    }

    #[tokio::test]
    async fn test_batch_empty_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;

        let params = FilingBatchFetchParams::default();
        let result = batch_fetch_impl(pipeline.batch(), RenderQuality::High, params, &CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_batch_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        let descriptors = (0..=MAX_BATCH).map(|i| descriptor(&i.to_string(), 1, "a.htm")).collect();
        let params = FilingBatchFetchParams { descriptors, quality: None };

        let result = batch_fetch_impl(pipeline.batch(), RenderQuality::High, params, &CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_batch_mixed_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        let params = FilingBatchFetchParams {
            descriptors: vec![
                descriptor("a", 1, "nvda-8k-1.htm"),
                descriptor("b", 2, "missing.htm"),
                descriptor("c", 3, "nvda-8k-3.htm"),
            ],
            quality: Some(RenderQuality::Low),
        };

        let result = batch_fetch_impl(pipeline.batch(), RenderQuality::High, params, &CancellationToken::new()).await;
        let out: FilingBatchFetchOutput = output(&result.unwrap());

        assert_eq!(out.summary.total, 3);
        assert_eq!(out.summary.fetched, 2);
        assert_eq!(out.summary.failed, 1);
        let failed = out.results.iter().find(|i| i.id == "b").unwrap();
        assert_eq!(failed.error_code.as_deref(), Some("NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_batch_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        let params = FilingBatchFetchParams {
            descriptors: vec![descriptor("a", 1, "nvda-8k-1.htm"), descriptor("b", 2, "nvda-8k-2.htm")],
            quality: None,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = batch_fetch_impl(pipeline.batch(), RenderQuality::High, params, &cancel).await;
        let out: FilingBatchFetchOutput = output(&result.unwrap());

        assert_eq!(out.summary.failed, 2);
        assert!(out.results.iter().all(|i| i.error_code.as_deref() == Some("CANCELLED")));
    }

    #[test]
    fn test_batch_item_status_serialization() {
        let json = serde_json::to_string(&BatchItemStatus::Cached).unwrap();
        assert!(json.contains("Cached"));
    }
}
