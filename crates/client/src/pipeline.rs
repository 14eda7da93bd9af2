//! One-stop wiring of the acquisition pipeline.

use std::sync::Arc;

use filings_core::{AppConfig, CacheStore, DocumentDescriptor, Error};
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchDownloader, BatchReport};
use crate::document::{DocumentClient, until_cancelled};
use crate::limiter::RateLimiter;
use crate::query::QueryClient;
use crate::transport::{ReqwestTransport, Transport};

/// Descriptors resolved for a subject and the outcome of fetching them.
#[derive(Debug)]
pub struct HistoricalFetch {
    pub descriptors: Vec<DocumentDescriptor>,
    pub report: BatchReport,
}

/// Every client of the pipeline sharing one limiter, one cache and one
/// transport.
#[derive(Debug)]
pub struct FilingPipeline {
    config: AppConfig,
    limiter: Arc<RateLimiter>,
    cache: CacheStore,
    query: QueryClient,
    documents: Arc<DocumentClient>,
    batch: BatchDownloader,
}

impl FilingPipeline {
    /// Build the pipeline with the production HTTP transport.
    pub async fn from_config(config: AppConfig) -> Result<Self, Error> {
        let transport =
            ReqwestTransport::new(&config.user_agent).map_err(|e| Error::FetchFailed(e.to_string()))?;
        Self::with_transport(config, Arc::new(transport)).await
    }

    /// Build the pipeline over any transport.
    ///
    /// Validates the configuration, requires the provider token, and opens
    /// the cache directory.
    pub async fn with_transport(config: AppConfig, transport: Arc<dyn Transport>) -> Result<Self, Error> {
        config.validate()?;

        let limiter = Arc::new(RateLimiter::from_config(&config));
        let cache = CacheStore::open(&config.cache_dir).await?;
        let query = QueryClient::new(&config, transport.clone(), limiter.clone())?;
        let documents = Arc::new(DocumentClient::new(&config, transport, limiter.clone(), cache.clone())?);
        let batch = BatchDownloader::new(documents.clone(), config.batch_max_workers);

        tracing::info!(
            cache_dir = %config.cache_dir.display(),
            cache_enabled = config.cache_enabled,
            batch_workers = batch.workers(),
            "filing pipeline ready"
        );

        Ok(Self { config, limiter, cache, query, documents, batch })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn query(&self) -> &QueryClient {
        &self.query
    }

    pub fn documents(&self) -> &Arc<DocumentClient> {
        &self.documents
    }

    pub fn batch(&self) -> &BatchDownloader {
        &self.batch
    }

    /// Resolve and fetch the latest annual and four quarterly reports.
    ///
    /// Cancelling during resolution fails the call; cancelling during the
    /// download marks unfinished items as cancelled in the report.
    pub async fn fetch_historical(&self, subject: &str, cancel: &CancellationToken) -> Result<HistoricalFetch, Error> {
        let descriptors = until_cancelled(cancel, self.query.historical(subject)).await??;
        if descriptors.is_empty() {
            return Err(Error::NotFound(format!("no annual or quarterly filings for {subject}")));
        }

        let report = self
            .batch
            .fetch_all_with_cancel(&descriptors, self.documents.default_quality(), cancel)
            .await;
        Ok(HistoricalFetch { descriptors, report })
    }
}
