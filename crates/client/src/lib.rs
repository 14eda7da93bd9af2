//! Client code for mcp-filings.
//!
//! This crate provides the document acquisition pipeline: tiered rate
//! limiting, the render-service document client with its polling state
//! machine, the filing search client, and concurrent batch downloads.

pub mod batch;
pub mod document;
pub mod flight;
pub mod limiter;
pub mod pipeline;
pub mod query;
pub mod retry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{BatchDownloader, BatchReport, BatchSummary};
pub use document::{DocumentClient, FetchError, FetchedDocument};
pub use limiter::{RateLimiter, Tier, TierPermit};
pub use pipeline::{FilingPipeline, HistoricalFetch};
pub use query::{QueryClient, QueryError, SearchRequest};
pub use retry::RetryPolicy;
pub use transport::{HttpReply, HttpRequest, ReqwestTransport, Transport, TransportError};

pub use tokio_util::sync::CancellationToken;
