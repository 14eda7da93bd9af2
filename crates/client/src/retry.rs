//! Retry ceilings, backoff, and "retry in N seconds" hint parsing.

use std::sync::LazyLock;
use std::time::Duration;

use filings_core::AppConfig;
use regex::Regex;

/// Free-text hint embedded in the provider's "still processing" message.
static RETRY_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry\s+in\s+(\d{1,6})\s*(?:seconds?|secs?|s)\b").expect("valid retry hint regex")
});

/// Structured wait fields checked before the free-text message.
const STRUCTURED_HINT_FIELDS: &[&str] = &["retryAfter", "retry_after", "retryAfterSeconds"];

/// Ceilings and delays governing one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Transient failures (timeouts, connection errors, 5xx) tolerated.
    pub max_retries: u32,
    /// Provider 429 responses tolerated. Counted separately from network faults.
    pub max_rate_limit_retries: u32,
    /// "Still processing" responses tolerated.
    pub max_processing_polls: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Wait used when a processing response carries no usable hint.
    pub processing_default_wait: Duration,
    pub processing_max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            max_rate_limit_retries: config.max_rate_limit_retries,
            max_processing_polls: config.max_processing_polls,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            processing_default_wait: Duration::from_millis(config.processing_default_wait_ms),
            processing_max_wait: Duration::from_millis(config.processing_max_wait_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based): `base × 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Wait before re-polling a document that is still being generated.
    ///
    /// A zero hint counts as no hint.
    pub fn processing_wait(&self, hint: Option<Duration>) -> Duration {
        hint.filter(|d| !d.is_zero())
            .unwrap_or(self.processing_default_wait)
            .min(self.processing_max_wait)
    }

    /// Wait after a 429, preferring the provider's `Retry-After`.
    pub fn rate_limit_wait(&self, hits: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .map(|d| d.min(self.max_delay))
            .unwrap_or_else(|| self.backoff(hits))
    }
}

/// Extract a suggested wait from a "still processing" response body.
///
/// The body is normally JSON like `{"message": "... Retry in 5 seconds."}`.
/// A numeric structured field wins over the message text; anything that does
/// not parse yields `None` so the caller falls back to its default.
pub fn parse_processing_hint(body: &[u8]) -> Option<Duration> {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(json) => {
            let structured = STRUCTURED_HINT_FIELDS
                .iter()
                .find_map(|field| json.get(*field).and_then(serde_json::Value::as_u64));
            if let Some(seconds) = structured {
                return Some(Duration::from_secs(seconds));
            }
            json.get("message")
                .and_then(serde_json::Value::as_str)
                .and_then(parse_retry_text)
        }
        Err(_) => parse_retry_text(&String::from_utf8_lossy(body)),
    }
}

/// Find "retry in N seconds" in free text.
pub fn parse_retry_text(text: &str) -> Option<Duration> {
    RETRY_HINT
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(Duration::from_secs)
}
