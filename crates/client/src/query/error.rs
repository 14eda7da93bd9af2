//! Search client error types.

use chrono::NaiveDate;

/// Errors from the filing search client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    /// No provider token configured.
    #[error("missing API key: set FILINGS_API_KEY")]
    MissingApiKey,

    /// Invalid ticker or CIK.
    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    /// Invalid size parameter (must be 1-50).
    #[error("invalid size: must be 1-50")]
    InvalidSize,

    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: HTTP {status}")]
    AuthError { status: u16 },

    /// Rate limited by the search service after all retries.
    #[error("rate limited: too many requests")]
    RateLimited,

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Transient failures exceeded the retry ceiling.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),
}

impl QueryError {
    /// True for caller mistakes, as opposed to service failures.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            QueryError::InvalidSubject(_) | QueryError::InvalidSize | QueryError::InvalidDateRange { .. }
        )
    }
}

impl From<QueryError> for filings_core::Error {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::MissingApiKey | QueryError::AuthError { .. } => filings_core::Error::AuthError(err.to_string()),
            e if e.is_invalid_input() => filings_core::Error::InvalidInput(e.to_string()),
            e => filings_core::Error::SearchFailed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueryError::MissingApiKey;
        assert!(err.to_string().contains("API key"));

        let err = QueryError::InvalidSubject("test".to_string());
        assert!(err.to_string().contains("invalid subject"));
    }

    #[test]
    fn test_into_core_error() {
        let core: filings_core::Error = QueryError::InvalidSize.into();
        assert!(core.to_string().starts_with("INVALID_INPUT:"));

        let core: filings_core::Error = QueryError::HttpError { status: 500 }.into();
        assert!(core.to_string().starts_with("SEARCH_FAILED:"));

        let core: filings_core::Error = QueryError::AuthError { status: 401 }.into();
        assert!(core.to_string().starts_with("AUTH_ERROR:"));
    }
}
