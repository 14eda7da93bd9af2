//! In-process fakes shared by the unit tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use filings_core::{AppConfig, CacheStore, DocumentDescriptor, DocumentType};

use crate::document::DocumentClient;
use crate::limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::transport::{HttpReply, HttpRequest, Transport, TransportError};

pub(crate) type Reply = Result<HttpReply, TransportError>;

type Handler = Box<dyn Fn(&HttpRequest) -> Reply + Send + Sync>;

/// Scripted remote: answers every request through a handler and records what
/// it was asked.
pub(crate) struct ScriptedTransport {
    handler: Handler,
    latency: Duration,
    requests: Mutex<Vec<HttpRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(handler: impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Replies in order; the last reply repeats once the script runs out.
    pub fn sequence(replies: Vec<Reply>) -> Self {
        let script = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            let mut script = script.lock().unwrap();
            if script.len() > 1 { script.pop_front().unwrap() } else { script.front().cloned().unwrap() }
        })
    }

    /// Every request gets the same reply.
    pub fn always(reply: Reply) -> Self {
        Self::new(move |_| reply.clone())
    }

    /// Simulated round-trip time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of requests observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let reply = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

pub(crate) fn ok(body: &'static str) -> Reply {
    Ok(HttpReply::new(200, body))
}

pub(crate) fn processing(seconds: u64) -> Reply {
    Ok(HttpReply::new(202, format!(r#"{{"message": "PDF generation in progress. Retry in {seconds} seconds."}}"#)))
}

pub(crate) fn status(code: u16) -> Reply {
    Ok(HttpReply::new(code, ""))
}

/// Config with a token and a one-second backoff base.
pub(crate) fn test_config(root: &Path) -> AppConfig {
    AppConfig {
        api_key: Some("test-token".into()),
        retry_base_delay_ms: 1_000,
        retry_max_delay_ms: 30_000,
        cache_dir: root.to_path_buf(),
        ..Default::default()
    }
}

pub(crate) async fn document_client(
    transport: Arc<ScriptedTransport>, limiter: RateLimiter, root: &Path,
) -> DocumentClient {
    let config = test_config(root);
    let cache = CacheStore::open(root).await.unwrap();
    DocumentClient::new(&config, transport, Arc::new(limiter), cache).unwrap()
}

pub(crate) async fn document_client_with_policy(
    transport: Arc<ScriptedTransport>, policy: RetryPolicy, root: &Path,
) -> DocumentClient {
    document_client(transport, RateLimiter::unlimited(), root)
        .await
        .with_policy(policy)
}

/// A 10-K descriptor with a per-index date so every index has its own cache key.
pub(crate) fn descriptor(subject: &str, index: u32) -> DocumentDescriptor {
    DocumentDescriptor::new(
        format!("0000320193-23-{index:06}"),
        subject,
        DocumentType::AnnualReport,
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + chrono::Days::new(u64::from(index)),
        format!("https://www.sec.gov/Archives/edgar/data/320193/{index:06}/doc.htm"),
    )
}
