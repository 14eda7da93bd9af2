//! Concurrent fan-out of document fetches.

use std::collections::BTreeMap;
use std::sync::Arc;

use filings_core::{DocumentDescriptor, RenderQuality};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::document::{DocumentClient, FetchError, FetchedDocument, until_cancelled};
use crate::limiter::Tier;

/// Per-descriptor outcomes of a batch, keyed by descriptor id.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: BTreeMap<String, Result<FetchedDocument, FetchError>>,
}

/// Counts for a finished batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub from_cache: usize,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Result<FetchedDocument, FetchError>> {
        self.results.get(id)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &FetchedDocument> {
        self.results.values().filter_map(|r| r.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &FetchError)> {
        self.results
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (id.as_str(), e)))
    }

    pub fn summary(&self) -> BatchSummary {
        let succeeded = self.succeeded().count();
        BatchSummary {
            total: self.results.len(),
            succeeded,
            failed: self.results.len() - succeeded,
            from_cache: self.succeeded().filter(|d| d.from_cache).count(),
        }
    }
}

/// Fetches many documents at once without exceeding the render tier.
#[derive(Debug, Clone)]
pub struct BatchDownloader {
    client: Arc<DocumentClient>,
    workers: usize,
}

impl BatchDownloader {
    /// Create a downloader running up to `max_workers` fetches at once,
    /// clamped to the render tier's concurrency ceiling.
    pub fn new(client: Arc<DocumentClient>, max_workers: usize) -> Self {
        let ceiling = client.limiter().max_concurrent(Tier::Render);
        let workers = max_workers.min(ceiling).max(1);
        if workers < max_workers {
            tracing::debug!(max_workers, ceiling, "batch workers clamped to render tier");
        }
        Self { client, workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetch every descriptor at the client's default quality.
    pub async fn fetch_all(&self, descriptors: &[DocumentDescriptor]) -> BatchReport {
        self.fetch_all_with_cancel(descriptors, self.client.default_quality(), &CancellationToken::new())
            .await
    }

    /// Fetch every descriptor; one entry per distinct descriptor id.
    ///
    /// Failures are recorded per item and never abort siblings. Items that
    /// have not finished when `cancel` fires report [`FetchError::Cancelled`].
    pub async fn fetch_all_with_cancel(
        &self, descriptors: &[DocumentDescriptor], quality: RenderQuality, cancel: &CancellationToken,
    ) -> BatchReport {
        let mut unique: Vec<DocumentDescriptor> = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if !unique.iter().any(|d| d.id == descriptor.id) {
                unique.push(descriptor.clone());
            }
        }

        tracing::info!(documents = unique.len(), workers = self.workers, "starting batch fetch");

        let slots = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for descriptor in unique.iter().cloned() {
            let client = self.client.clone();
            let slots = slots.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let result = fetch_one(&client, &slots, &descriptor, quality, &cancel).await;
                (descriptor.id, result)
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, result)) => {
                    if let Err(e) = &result {
                        tracing::warn!(%id, error = %e, "batch item failed");
                    }
                    report.results.insert(id, result);
                }
                Err(e) => tracing::error!(error = %e, "batch worker panicked"),
            }
        }

        for descriptor in &unique {
            report
                .results
                .entry(descriptor.id.clone())
                .or_insert_with(|| Err(FetchError::Internal("worker exited without a result".to_string())));
        }

        let summary = report.summary();
        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            from_cache = summary.from_cache,
            "batch fetch finished"
        );
        report
    }
}

async fn fetch_one(
    client: &DocumentClient, slots: &Semaphore, descriptor: &DocumentDescriptor, quality: RenderQuality,
    cancel: &CancellationToken,
) -> Result<FetchedDocument, FetchError> {
    let _worker = until_cancelled(cancel, slots.acquire())
        .await?
        .map_err(|_| FetchError::Internal("worker pool closed".to_string()))?;
    let _download = until_cancelled(cancel, client.limiter().acquire(Tier::Download)).await?;

    client.fetch_with_cancel(descriptor, quality, cancel).await
}
