//! Fetch state machine.
//!
//! ```text
//! Idle -> Requesting -> Ready
//!                    -> Processing     -> (sleep hint)    -> Requesting
//!                    -> TransientError -> (backoff)       -> Requesting
//!                    -> PermanentError
//! ```
//!
//! [`transition`] is pure: it consumes the attempt so far and the outcome of
//! one round trip and says what to do next. All sleeping and I/O happens in
//! the caller.

use std::time::Duration;

use bytes::Bytes;

use super::error::FetchError;
use crate::retry::{RetryPolicy, parse_processing_hint};
use crate::transport::{HttpReply, TransportError};

/// Longest slice of an error body carried into an error message.
const MAX_ERROR_BODY: usize = 200;

/// Where a fetch currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Requesting,
    Ready,
    Processing,
    TransientError,
    PermanentError,
}

/// Interpretation of one render round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 200 with the artifact bytes.
    Ready(Bytes),
    /// 202: the document is being generated.
    Processing { hint: Option<Duration> },
    /// 429 from the provider.
    RateLimited { retry_after: Option<Duration> },
    /// Timeout, connection failure, 5xx.
    Transient(String),
    NotFound,
    /// 401/403.
    Unauthorized(u16),
    /// Any other non-success status.
    Permanent { status: u16, message: String },
}

impl Outcome {
    /// Classify a transport result.
    pub fn classify(result: Result<HttpReply, TransportError>) -> Self {
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => return Outcome::Transient(e.to_string()),
        };

        match reply.status {
            200 if reply.body.is_empty() => Outcome::Transient("empty document body".to_string()),
            200 => Outcome::Ready(reply.body),
            202 => Outcome::Processing { hint: reply.retry_after.or_else(|| parse_processing_hint(&reply.body)) },
            429 => Outcome::RateLimited { retry_after: reply.retry_after },
            401 | 403 => Outcome::Unauthorized(reply.status),
            404 => Outcome::NotFound,
            500..=599 => Outcome::Transient(format!("HTTP {}", reply.status)),
            status => Outcome::Permanent { status, message: error_message(&reply.body) },
        }
    }
}

/// Pull a readable message out of an error body.
fn error_message(body: &[u8]) -> String {
    let text = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    let text = text.trim();
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Per-call counters. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    /// Descriptor id, used in error messages.
    pub document_id: String,
    pub state: FetchState,
    /// Round trips issued so far.
    pub requests: u32,
    pub transient_failures: u32,
    pub rate_limit_hits: u32,
    pub processing_polls: u32,
    /// Wait suggested by the most recent processing response.
    pub wait_hint: Option<Duration>,
}

impl FetchAttempt {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            state: FetchState::Idle,
            requests: 0,
            transient_failures: 0,
            rate_limit_hits: 0,
            processing_polls: 0,
            wait_hint: None,
        }
    }

    /// Mark a round trip as issued.
    pub fn begin_request(mut self) -> Self {
        self.state = FetchState::Requesting;
        self.requests += 1;
        self
    }
}

/// What the caller does next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Complete(Bytes),
    /// Sleep, then issue another request.
    Retry(Duration),
    Fail(FetchError),
}

/// Advance the state machine by one outcome.
pub fn transition(mut attempt: FetchAttempt, outcome: Outcome, policy: &RetryPolicy) -> (FetchAttempt, Step) {
    let step = match outcome {
        Outcome::Ready(bytes) => {
            attempt.state = FetchState::Ready;
            Step::Complete(bytes)
        }

        Outcome::Processing { hint } => {
            attempt.processing_polls += 1;
            attempt.wait_hint = hint;
            if attempt.processing_polls >= policy.max_processing_polls {
                attempt.state = FetchState::PermanentError;
                Step::Fail(FetchError::ProcessingTimedOut { polls: attempt.processing_polls })
            } else {
                attempt.state = FetchState::Processing;
                Step::Retry(policy.processing_wait(hint))
            }
        }

        Outcome::RateLimited { retry_after } => {
            attempt.rate_limit_hits += 1;
            if attempt.rate_limit_hits > policy.max_rate_limit_retries {
                attempt.state = FetchState::PermanentError;
                Step::Fail(FetchError::RateLimitExhausted { hits: attempt.rate_limit_hits })
            } else {
                attempt.state = FetchState::TransientError;
                Step::Retry(policy.rate_limit_wait(attempt.rate_limit_hits, retry_after))
            }
        }

        Outcome::Transient(reason) => {
            attempt.transient_failures += 1;
            if attempt.transient_failures > policy.max_retries {
                attempt.state = FetchState::PermanentError;
                Step::Fail(FetchError::RetriesExhausted { attempts: attempt.requests, last_error: reason })
            } else {
                attempt.state = FetchState::TransientError;
                Step::Retry(policy.backoff(attempt.transient_failures))
            }
        }

        Outcome::NotFound => {
            attempt.state = FetchState::PermanentError;
            Step::Fail(FetchError::NotFound(attempt.document_id.clone()))
        }

        Outcome::Unauthorized(status) => {
            attempt.state = FetchState::PermanentError;
            Step::Fail(FetchError::Authentication { status })
        }

        Outcome::Permanent { status, message } => {
            attempt.state = FetchState::PermanentError;
            Step::Fail(FetchError::Permanent { status, message })
        }
    };

    (attempt, step)
}
