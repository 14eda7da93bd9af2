//! Rendered document client.
//!
//! Fetches one filing as a PDF from the render service, which answers with
//! one of three outcomes:
//!
//! - **ready**: `200` with the artifact bytes
//! - **processing**: `202` with a message like "Retry in 5 seconds"
//! - **error**: transient (timeout, 5xx, 429) or permanent (other 4xx)
//!
//! ### Protocol
//!
//! - **Endpoint**: `GET {render_url}?token=&url=&quality=`
//! - **Rate limiting**: each round trip holds a [`Tier::Render`] permit, and
//!   only for the duration of the round trip.
//! - **Retries**: driven by the pure [`state::transition`] function.
//! - **Caching**: a hit in the [`CacheStore`] short-circuits the network;
//!   the first ready outcome is persisted.
//! - **Deduplication**: concurrent fetches of one cache key share a run.

pub mod error;
pub mod source;
pub mod state;

pub use error::FetchError;
pub use source::{SourceError, normalize_source_url};
pub use state::{FetchAttempt, FetchState, Outcome, Step, transition};

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use filings_core::{AppConfig, CacheKey, CacheMetadata, CacheStore, DocumentDescriptor, RenderQuality};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::flight::SingleFlight;
use crate::limiter::{RateLimiter, Tier};
use crate::retry::RetryPolicy;
use crate::transport::{HttpRequest, Transport};

/// A document available on local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedDocument {
    /// Descriptor id.
    pub id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// True when served from the cache without a network call.
    pub from_cache: bool,
}

type SharedOutcome = Result<FetchedDocument, FetchError>;

/// Client for the render service.
pub struct DocumentClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    cache: CacheStore,
    policy: RetryPolicy,
    render_url: String,
    api_key: String,
    render_timeout: Duration,
    default_quality: RenderQuality,
    cache_enabled: bool,
    flight: SingleFlight<SharedOutcome>,
}

impl std::fmt::Debug for DocumentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentClient")
            .field("render_url", &self.render_url)
            .field("cache_root", &self.cache.root())
            .field("cache_enabled", &self.cache_enabled)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl DocumentClient {
    /// Create a client.
    ///
    /// Fails with [`FetchError::MissingApiKey`] when no token is configured,
    /// so a misconfigured process never reaches the network.
    pub fn new(
        config: &AppConfig, transport: Arc<dyn Transport>, limiter: Arc<RateLimiter>, cache: CacheStore,
    ) -> Result<Self, FetchError> {
        let api_key = config.require_api_key().map_err(|_| FetchError::MissingApiKey)?;

        Ok(Self {
            transport,
            limiter,
            cache,
            policy: RetryPolicy::from_config(config),
            render_url: config.render_url.clone(),
            api_key: api_key.to_string(),
            render_timeout: config.render_timeout(),
            default_quality: config.render_quality,
            cache_enabled: config.cache_enabled,
            flight: SingleFlight::new(),
        })
    }

    /// Replace the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn default_quality(&self) -> RenderQuality {
        self.default_quality
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetch a rendered document, from cache when possible.
    pub async fn fetch(&self, descriptor: &DocumentDescriptor, quality: RenderQuality) -> SharedOutcome {
        self.fetch_with_cancel(descriptor, quality, &CancellationToken::new())
            .await
    }

    /// Fetch a rendered document, giving up with [`FetchError::Cancelled`]
    /// as soon as `cancel` fires.
    ///
    /// Concurrent calls for the same document share one run. A cancelled
    /// caller never hands its cancellation to the others.
    pub async fn fetch_with_cancel(
        &self, descriptor: &DocumentDescriptor, quality: RenderQuality, cancel: &CancellationToken,
    ) -> SharedOutcome {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let key = CacheKey::for_descriptor(descriptor)?;
        let flight_key = format!("{}:{}", key.digest(), quality.as_str());
        let shared = self.flight.run(&flight_key, || async {
            match self.fetch_uncoalesced(descriptor, &key, quality, cancel).await {
                Err(FetchError::Cancelled) => Err(FetchError::Cancelled),
                outcome => Ok(outcome),
            }
        });

        // A joined run may belong to another descriptor with the same key.
        match until_cancelled(cancel, shared).await {
            Ok(Ok(outcome)) => outcome.map(|doc| FetchedDocument { id: descriptor.id.clone(), ..doc }),
            Ok(Err(e)) | Err(e) => Err(e),
        }
    }

    async fn fetch_uncoalesced(
        &self, descriptor: &DocumentDescriptor, key: &CacheKey, quality: RenderQuality, cancel: &CancellationToken,
    ) -> SharedOutcome {
        if self.cache_enabled
            && let Some(hit) = self.cache.get(key).await?
        {
            if let Some(meta) = &hit.metadata
                && meta.id != descriptor.id
            {
                tracing::warn!(
                    id = %descriptor.id,
                    cached_id = %meta.id,
                    stem = %key.stem(),
                    "cache entry was written for another filing"
                );
            }
            let size_bytes = match &hit.metadata {
                Some(meta) => meta.size_bytes,
                None => tokio::fs::metadata(&hit.path)
                    .await
                    .map_err(|e| FetchError::Cache(e.to_string()))?
                    .len(),
            };
            return Ok(FetchedDocument { id: descriptor.id.clone(), path: hit.path, size_bytes, from_cache: true });
        }

        let source = normalize_source_url(&descriptor.source_url)
            .map_err(|e| FetchError::InvalidDescriptor(format!("{}: {e}", descriptor.id)))?;

        let bytes = self.render(descriptor, source.as_str(), quality, cancel).await?;
        self.persist(descriptor, key, &bytes).await
    }

    /// Drive the fetch state machine until it completes or fails.
    async fn render(
        &self, descriptor: &DocumentDescriptor, source: &str, quality: RenderQuality, cancel: &CancellationToken,
    ) -> Result<Bytes, FetchError> {
        let mut attempt = FetchAttempt::new(descriptor.id.clone());

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            attempt = attempt.begin_request();

            let request = HttpRequest::get(&self.render_url, self.render_timeout)
                .query("token", &self.api_key)
                .query("url", source)
                .query("quality", quality.as_str());

            let result = {
                let _permit = until_cancelled(cancel, self.limiter.acquire(Tier::Render)).await?;
                tracing::debug!(id = %descriptor.id, request = attempt.requests, "render request");
                until_cancelled(cancel, self.transport.send(request)).await?
            };

            let (next, step) = transition(attempt, Outcome::classify(result), &self.policy);
            attempt = next;

            match step {
                Step::Complete(bytes) => {
                    tracing::debug!(id = %descriptor.id, requests = attempt.requests, bytes = bytes.len(), "document ready");
                    return Ok(bytes);
                }
                Step::Retry(wait) => {
                    match attempt.state {
                        FetchState::Processing => tracing::debug!(
                            id = %descriptor.id,
                            poll = attempt.processing_polls,
                            wait_secs = wait.as_secs_f64(),
                            "document still processing"
                        ),
                        _ => tracing::warn!(
                            id = %descriptor.id,
                            transient_failures = attempt.transient_failures,
                            rate_limit_hits = attempt.rate_limit_hits,
                            wait_secs = wait.as_secs_f64(),
                            "render request failed, retrying"
                        ),
                    }
                    until_cancelled(cancel, tokio::time::sleep(wait)).await?;
                }
                Step::Fail(err) => {
                    tracing::warn!(id = %descriptor.id, requests = attempt.requests, error = %err, "render failed");
                    return Err(err);
                }
            }
        }
    }

    async fn persist(&self, descriptor: &DocumentDescriptor, key: &CacheKey, bytes: &[u8]) -> SharedOutcome {
        let metadata = CacheMetadata::capture(descriptor, &self.cache.artifact_path(key), bytes);
        let stored = self.cache.put(key, bytes, &metadata).await?;

        Ok(FetchedDocument {
            id: descriptor.id.clone(),
            path: stored.path,
            size_bytes: bytes.len() as u64,
            from_cache: false,
        })
    }
}

/// Race `fut` against `cancel`.
pub(crate) async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, FetchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        output = fut => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        ScriptedTransport, descriptor, document_client, document_client_with_policy, ok, processing, status,
    };
    use crate::transport::TransportError;
    use filings_core::TierLimits;
    use tokio::time::Instant;

    fn fast_policy(max_processing_polls: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            max_rate_limit_retries: 3,
            max_processing_polls,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            processing_default_wait: Duration::from_secs(5),
            processing_max_wait: Duration::from_secs(60),
        }
    }

    async fn assert_nothing_cached(client: &DocumentClient, desc: &DocumentDescriptor) {
        let key = CacheKey::for_descriptor(desc).unwrap();
        assert!(client.cache().get(&key).await.unwrap().is_none());
        let subject_dir = client.cache().root().join("artifacts").join(&desc.subject);
        assert!(!tokio::fs::try_exists(&subject_dir).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_request() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::always(ok("%PDF-1.7")));
        let client = document_client(transport.clone(), RateLimiter::unlimited(), dir.path()).await;

        let doc = client.fetch(&descriptor("AAPL", 1), RenderQuality::High).await.unwrap();
        assert!(!doc.from_cache);
        assert_eq!(doc.size_bytes, 8);
        assert_eq!(tokio::fs::read(&doc.path).await.unwrap(), b"%PDF-1.7");
        assert!(doc.path.ends_with("artifacts/AAPL/AAPL_10-K_2023-01-02.pdf"));

        let request = &transport.requests()[0];
        assert_eq!(request.query_value("token"), Some("test-token"));
        assert_eq!(request.query_value("quality"), Some("high"));
        assert_eq!(
            request.query_value("url"),
            Some("https://www.sec.gov/Archives/edgar/data/320193/000001/doc.htm")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::always(ok("%PDF-1.7 body")));
        let client = document_client(transport.clone(), RateLimiter::unlimited(), dir.path()).await;
        let desc = descriptor("AAPL", 1);

        let first = client.fetch(&desc, RenderQuality::High).await.unwrap();
        let second = client.fetch(&desc, RenderQuality::High).await.unwrap();

        assert_eq!(transport.calls(), 1);
        assert!(second.from_cache);
        assert_eq!(first.path, second.path);
        assert_eq!(
            tokio::fs::read(&first.path).await.unwrap(),
            tokio::fs::read(&second.path).await.unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_cache_still_persists() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::always(ok("%PDF")));
        let config = AppConfig { cache_enabled: false, ..crate::testing::test_config(dir.path()) };
        let cache = CacheStore::open(dir.path()).await.unwrap();
        let client =
            DocumentClient::new(&config, transport.clone(), Arc::new(RateLimiter::unlimited()), cache).unwrap();
        let desc = descriptor("MSFT", 2);

        client.fetch(&desc, RenderQuality::Low).await.unwrap();
        let again = client.fetch(&desc, RenderQuality::Low).await.unwrap();

        assert_eq!(transport.calls(), 2);
        assert!(!again.from_cache);
        assert!(again.path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_processing_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::sequence(vec![processing(2), ok("%PDF")]));
        let client = document_client_with_policy(transport.clone(), fast_policy(24), dir.path()).await;

        let start = Instant::now();
        let doc = client.fetch(&descriptor("NVDA", 3), RenderQuality::High).await.unwrap();

        assert_eq!(transport.calls(), 2);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(!doc.from_cache);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_termination() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::always(processing(1)));
        let client = document_client_with_policy(transport.clone(), fast_policy(3), dir.path()).await;

        let result = client.fetch(&descriptor("TSLA", 4), RenderQuality::High).await;

        assert_eq!(result, Err(FetchError::ProcessingTimedOut { polls: 3 }));
        assert_eq!(transport.calls(), 3);
        assert_nothing_cached(&client, &descriptor("TSLA", 4)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::sequence(vec![Err(TransportError::Timeout), ok("%PDF")]));
        let client = document_client_with_policy(transport.clone(), fast_policy(24), dir.path()).await;

        let start = Instant::now();
        let doc = client.fetch(&descriptor("AMZN", 5), RenderQuality::High).await;

        assert!(doc.is_ok());
        assert_eq!(transport.calls(), 2);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::always(status(503)));
        let client = document_client_with_policy(transport.clone(), fast_policy(24), dir.path()).await;

        let result = client.fetch(&descriptor("META", 6), RenderQuality::High).await;

        assert!(matches!(result, Err(FetchError::RetriesExhausted { attempts: 4, .. })));
        assert_eq!(transport.calls(), 4);
        assert_nothing_cached(&client, &descriptor("META", 6)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        for (code, expected) in [(404, "NOT_FOUND"), (401, "AUTH_ERROR"), (422, "PERMANENT_ERROR")] {
            let dir = tempfile::tempdir().unwrap();
            let transport = Arc::new(ScriptedTransport::always(status(code)));
            let client = document_client_with_policy(transport.clone(), fast_policy(24), dir.path()).await;

            let err = client.fetch(&descriptor("IBM", 7), RenderQuality::High).await.unwrap_err();
            assert_eq!(err.code(), expected);
            assert_eq!(transport.calls(), 1);
            assert_nothing_cached(&client, &descriptor("IBM", 7)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_honours_retry_after() {
        let dir = tempfile::tempdir().unwrap();
        let limited = Ok(crate::transport::HttpReply::new(429, "").with_retry_after(Duration::from_secs(4)));
        let transport = Arc::new(ScriptedTransport::sequence(vec![limited, ok("%PDF")]));
        let client = document_client_with_policy(transport.clone(), fast_policy(24), dir.path()).await;

        let start = Instant::now();
        client.fetch(&descriptor("ORCL", 8), RenderQuality::High).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_share_one_request() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::always(ok("%PDF")).with_latency(Duration::from_millis(500)));
        let client = Arc::new(document_client(transport.clone(), RateLimiter::unlimited(), dir.path()).await);
        let desc = descriptor("AAPL", 9);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let client = client.clone();
            let desc = desc.clone();
            handles.push(tokio::spawn(async move { client.fetch(&desc, RenderQuality::High).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_processing_wait() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::always(processing(30)));
        let client = document_client_with_policy(transport.clone(), fast_policy(24), dir.path()).await;
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = client
            .fetch_with_cancel(&descriptor("AAPL", 10), RenderQuality::High, &cancel)
            .await;
        assert_eq!(result, Err(FetchError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(30));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_for_render_slot() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::always(ok("%PDF")));
        let limiter = RateLimiter::new([(Tier::Render, TierLimits::new(1, 0))]);
        let client = document_client(transport.clone(), limiter, dir.path()).await;

        let _held = client.limiter().acquire(Tier::Render).await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = client
            .fetch_with_cancel(&descriptor("AAPL", 11), RenderQuality::High, &cancel)
            .await;
        assert_eq!(result, Err(FetchError::Cancelled));
        assert_eq!(transport.calls(), 0);
        assert_eq!(client.limiter().available(Tier::Render), 0);
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig { api_key: None, ..Default::default() };
        let cache = CacheStore::open(dir.path()).await.unwrap();
        let transport = Arc::new(ScriptedTransport::always(ok("%PDF")));

        let result = DocumentClient::new(&config, transport, Arc::new(RateLimiter::unlimited()), cache);
        assert!(matches!(result, Err(FetchError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_invalid_source_url() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::always(ok("%PDF")));
        let client = document_client(transport.clone(), RateLimiter::unlimited(), dir.path()).await;
        let mut desc = descriptor("AAPL", 12);
        desc.source_url = "https://example.com/report.pdf".into();

        let result = client.fetch(&desc, RenderQuality::High).await;
        assert!(matches!(result, Err(FetchError::InvalidDescriptor(_))));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_at_different_quality_run_separately() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::always(ok("%PDF")).with_latency(Duration::from_millis(500)));
        let client = document_client(transport.clone(), RateLimiter::unlimited(), dir.path()).await;
        let desc = descriptor("AAPL", 13);

        let (low, high) =
            tokio::join!(client.fetch(&desc, RenderQuality::Low), client.fetch(&desc, RenderQuality::High));
        assert!(low.is_ok() && high.is_ok());

        let mut qualities: Vec<String> = transport
            .requests()
            .iter()
            .filter_map(|r| r.query_value("quality").map(str::to_string))
            .collect();
        qualities.sort();
        assert_eq!(qualities, ["high", "low"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_outcome_keeps_caller_id() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::always(ok("%PDF")).with_latency(Duration::from_millis(500)));
        let client = document_client(transport.clone(), RateLimiter::unlimited(), dir.path()).await;
        let first = descriptor("AAPL", 14);
        let second = DocumentDescriptor { id: "0000320193-23-999999".into(), ..first.clone() };

        let (a, b) = tokio::join!(
            client.fetch(&first, RenderQuality::High),
            client.fetch(&second, RenderQuality::High)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(transport.calls(), 1);
        assert_eq!(a.id, first.id);
        assert_eq!(b.id, second.id);
        assert_eq!(a.path, b.path);

        let cached = client.fetch(&second, RenderQuality::High).await.unwrap();
        assert!(cached.from_cache);
        assert_eq!(cached.id, second.id);
    }
}
