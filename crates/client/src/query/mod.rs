//! Filing search client.
//!
//! Resolves [`DocumentDescriptor`]s from the provider's full-text query API.
//!
//! ### Protocol
//!
//! - **Endpoint**: `POST {query_url}` with a Lucene query in a JSON body
//! - **Authentication**: the token goes in the `Authorization` header
//! - **Rate limiting**: searches run under [`Tier::Search`], accession
//!   lookups under [`Tier::Query`]
//! - **Retries**: 429, 5xx and network failures back off and retry; other
//!   statuses fail immediately
//! - **Normalization**: hits missing an id, date or locator are skipped
//!   individually; an empty page (or 404) is an empty result, not an error

pub mod error;
pub mod request;
pub mod response;

pub use error::QueryError;
pub use request::{QueryPayload, SearchRequest, Subject};
pub use response::{QueryApiResponse, RawFiling};

use std::sync::Arc;
use std::time::Duration;

use filings_core::{AppConfig, DocumentDescriptor, DocumentType};

use crate::limiter::{RateLimiter, Tier};
use crate::retry::RetryPolicy;
use crate::transport::{HttpRequest, Transport};

/// Quarterly reports included in a historical set.
const HISTORICAL_QUARTERS: u8 = 4;

/// Search service client.
pub struct QueryClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    query_url: String,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("query_url", &self.query_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    /// Create a new client. Fails when no token is configured.
    pub fn new(config: &AppConfig, transport: Arc<dyn Transport>, limiter: Arc<RateLimiter>) -> Result<Self, QueryError> {
        let api_key = config.require_api_key().map_err(|_| QueryError::MissingApiKey)?;

        Ok(Self {
            transport,
            limiter,
            policy: RetryPolicy::from_config(config),
            query_url: config.query_url.clone(),
            api_key: api_key.to_string(),
            timeout: config.request_timeout(),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Latest filings for one subject, newest first.
    pub async fn search(
        &self, subject: &str, document_type: Option<DocumentType>, limit: usize,
    ) -> Result<Vec<DocumentDescriptor>, QueryError> {
        let size = u8::try_from(limit).map_err(|_| QueryError::InvalidSize)?;
        let mut req = SearchRequest::for_subject(subject).size(size);
        req.document_type = document_type;
        self.search_request(&req).await
    }

    /// Run a structured search.
    pub async fn search_request(&self, req: &SearchRequest) -> Result<Vec<DocumentDescriptor>, QueryError> {
        let payload = req.to_payload()?;
        let fallback = match req.subjects.as_slice() {
            [only] => Some(only.trim()),
            _ => None,
        };

        tracing::debug!(query = %payload.query, size = %payload.size, "searching filings");
        let descriptors = self.execute(Tier::Search, &payload, fallback).await?;
        tracing::debug!(query = %payload.query, results = descriptors.len(), "search completed");
        Ok(descriptors)
    }

    /// Resolve one filing by accession number.
    pub async fn lookup(&self, accession_no: &str) -> Result<Option<DocumentDescriptor>, QueryError> {
        let accession_no = accession_no.trim();
        if accession_no.is_empty() || !accession_no.chars().all(|c| c.is_ascii_digit() || c == '-') {
            return Err(QueryError::InvalidSubject(format!("invalid accession number: {accession_no}")));
        }

        let payload = QueryPayload {
            query: format!("accessionNo:\"{accession_no}\""),
            from: "0".to_string(),
            size: "1".to_string(),
            sort: vec![serde_json::json!({"filedAt": {"order": "desc"}})],
        };

        let descriptors = self.execute(Tier::Query, &payload, None).await?;
        Ok(descriptors.into_iter().find(|d| d.id == accession_no))
    }

    /// Latest annual report plus the four latest quarterly reports.
    pub async fn historical(&self, subject: &str) -> Result<Vec<DocumentDescriptor>, QueryError> {
        let annual = SearchRequest::for_subject(subject)
            .document_type(DocumentType::AnnualReport)
            .size(1);
        let quarterly = SearchRequest::for_subject(subject)
            .document_type(DocumentType::QuarterlyReport)
            .size(HISTORICAL_QUARTERS);

        let mut descriptors = self.search_request(&annual).await?;
        descriptors.extend(self.search_request(&quarterly).await?);
        Ok(descriptors)
    }

    async fn execute(
        &self, tier: Tier, payload: &QueryPayload, fallback: Option<&str>,
    ) -> Result<Vec<DocumentDescriptor>, QueryError> {
        let body = serde_json::to_value(payload).map_err(|e| QueryError::Parse(e.to_string()))?;
        let mut attempts = 0u32;
        let mut transient_failures = 0u32;
        let mut rate_limit_hits = 0u32;

        loop {
            attempts += 1;
            let request = HttpRequest::post_json(&self.query_url, body.clone(), self.timeout)
                .header("Authorization", &self.api_key)
                .header("Accept", "application/json");

            let result = {
                let _permit = self.limiter.acquire(tier).await;
                self.transport.send(request).await
            };

            let last_error = match result {
                Ok(reply) => match reply.status {
                    200 => return parse_page(&reply.body, fallback),
                    404 => return Ok(Vec::new()),
                    401 | 403 => return Err(QueryError::AuthError { status: reply.status }),
                    429 => {
                        rate_limit_hits += 1;
                        if rate_limit_hits > self.policy.max_rate_limit_retries {
                            return Err(QueryError::RateLimited);
                        }
                        let wait = self.policy.rate_limit_wait(rate_limit_hits, reply.retry_after);
                        tracing::warn!(%tier, rate_limit_hits, wait_secs = wait.as_secs_f64(), "search rate limited");
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    500..=599 => format!("HTTP {}", reply.status),
                    status => return Err(QueryError::HttpError { status }),
                },
                Err(e) => e.to_string(),
            };

            transient_failures += 1;
            if transient_failures > self.policy.max_retries {
                return Err(QueryError::RetriesExhausted { attempts, last_error });
            }
            let wait = self.policy.backoff(transient_failures);
            tracing::warn!(%tier, attempts, error = %last_error, wait_secs = wait.as_secs_f64(), "search failed, retrying");
            tokio::time::sleep(wait).await;
        }
    }
}

fn parse_page(body: &[u8], fallback: Option<&str>) -> Result<Vec<DocumentDescriptor>, QueryError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let page: QueryApiResponse = serde_json::from_slice(body).map_err(|e| QueryError::Parse(e.to_string()))?;
    Ok(page.into_descriptors(fallback))
}
