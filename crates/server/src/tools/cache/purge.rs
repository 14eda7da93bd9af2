//! cache_purge tool implementation.
//!
//! Purges cached filings by subject or by age.

use std::time::Duration;

use filings_core::{CacheStore, Error};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Purge every filing cached for this ticker or CIK.
    #[serde(default)]
    pub subject: Option<String>,

    /// Purge filings cached more than this many days ago.
    #[serde(default)]
    pub older_than_days: Option<u64>,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of filings deleted.
    pub deleted: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(cache: &CacheStore, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if params.subject.is_none() && params.older_than_days.is_none() {
        return Err(Error::InvalidInput("At least one of subject or older_than_days must be specified".into()).into());
    }

    let mut deleted_total = 0u64;

    if let Some(subject) = params.subject {
        deleted_total += cache.purge_subject(&subject).await?;
    }

    if let Some(days) = params.older_than_days {
        let age = Duration::from_secs(days.saturating_mul(SECS_PER_DAY));
        deleted_total += cache.purge_older_than(age).await?;
    }

    json_result(&CachePurgeOutput { deleted: deleted_total })
}
