//! Document fetch error types.

/// Terminal failures of a single document fetch.
///
/// Cloneable so one outcome can be shared by every caller waiting on the
/// same in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// No provider token configured.
    #[error("missing API key: set FILINGS_API_KEY")]
    MissingApiKey,

    /// The provider rejected the token (401/403).
    #[error("authentication failed: HTTP {status}")]
    Authentication { status: u16 },

    /// The provider has no such document (404).
    #[error("document not found: {0}")]
    NotFound(String),

    /// Any other 4xx response.
    #[error("render request rejected: HTTP {status}: {message}")]
    Permanent { status: u16, message: String },

    /// Transient failures exceeded the retry ceiling.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// 429 responses exceeded their own ceiling.
    #[error("rate limited: gave up after {hits} responses")]
    RateLimitExhausted { hits: u32 },

    /// The document never left the processing state.
    #[error("document still processing after {polls} polls")]
    ProcessingTimedOut { polls: u32 },

    /// The caller cancelled the fetch.
    #[error("fetch cancelled")]
    Cancelled,

    /// The descriptor cannot produce a cache key or render request.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Reading or writing the cache failed.
    #[error("cache error: {0}")]
    Cache(String),

    /// A worker task failed without reporting a result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::MissingApiKey | FetchError::Authentication { .. } => "AUTH_ERROR",
            FetchError::NotFound(_) => "NOT_FOUND",
            FetchError::Permanent { .. } => "PERMANENT_ERROR",
            FetchError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            FetchError::RateLimitExhausted { .. } => "RATE_LIMITED",
            FetchError::ProcessingTimedOut { .. } => "PROCESSING_TIMEOUT",
            FetchError::Cancelled => "CANCELLED",
            FetchError::InvalidDescriptor(_) => "INVALID_DESCRIPTOR",
            FetchError::Cache(_) => "CACHE_ERROR",
            FetchError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<filings_core::Error> for FetchError {
    fn from(err: filings_core::Error) -> Self {
        match err {
            filings_core::Error::InvalidInput(msg) | filings_core::Error::InvalidDescriptor(msg) => {
                FetchError::InvalidDescriptor(msg)
            }
            other => FetchError::Cache(other.to_string()),
        }
    }
}

impl From<FetchError> for filings_core::Error {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::MissingApiKey | FetchError::Authentication { .. } => {
                filings_core::Error::AuthError(err.to_string())
            }
            FetchError::NotFound(_) => filings_core::Error::NotFound(err.to_string()),
            FetchError::InvalidDescriptor(msg) => filings_core::Error::InvalidDescriptor(msg),
            other => filings_core::Error::FetchFailed(other.to_string()),
        }
    }
}
