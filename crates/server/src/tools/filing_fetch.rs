//! filing_fetch tool implementation.
//!
//! Fetches one filing as a rendered PDF, from the local cache when possible.

use filings_client::{CancellationToken, FetchedDocument, FilingPipeline};
use filings_core::{DocumentDescriptor, Error, RenderQuality};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::tools::json_result;

/// Input parameters for filing_fetch tool.
///
/// Exactly one of `accession_no` or `descriptor` must be given.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FilingFetchParams {
    /// Accession number to resolve through the search service.
    #[serde(default)]
    pub accession_no: Option<String>,

    /// A descriptor previously returned by filing_search.
    #[serde(default)]
    pub descriptor: Option<DocumentDescriptor>,

    /// Render quality: low, medium or high (server default when omitted).
    #[serde(default)]
    pub quality: Option<RenderQuality>,
}

/// Output structure for filing_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FilingFetchOutput {
    /// The filing that was fetched.
    pub descriptor: DocumentDescriptor,
    /// Local path of the PDF.
    pub path: String,
    pub size_bytes: u64,
    /// Whether the PDF came from the local cache.
    pub from_cache: bool,
}

impl FilingFetchOutput {
    pub(crate) fn new(descriptor: DocumentDescriptor, doc: FetchedDocument) -> Self {
        Self {
            descriptor,
            path: doc.path.display().to_string(),
            size_bytes: doc.size_bytes,
            from_cache: doc.from_cache,
        }
    }
}

/// Implementation of the filing_fetch tool.
///
/// Stops polling the render service as soon as `cancel` fires.
pub async fn fetch_impl(
    pipeline: &FilingPipeline, params: FilingFetchParams, cancel: &CancellationToken,
) -> Result<CallToolResult, McpError> {
    let descriptor = match (params.accession_no, params.descriptor) {
        (Some(accession_no), None) => pipeline
            .query()
            .lookup(&accession_no)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::NotFound(format!("no filing with accession number {accession_no}")))?,
        (None, Some(descriptor)) => descriptor,
        _ => {
            return Err(ToolError::InvalidInput("exactly one of accession_no or descriptor is required".into()).into());
        }
    };

    let quality = params
        .quality
        .unwrap_or_else(|| pipeline.documents().default_quality());
    let doc = pipeline
        .documents()
        .fetch_with_cancel(&descriptor, quality, cancel)
        .await
        .map_err(Error::from)?;

    json_result(&FilingFetchOutput::new(descriptor, doc))
}
