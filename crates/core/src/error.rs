//! Unified error types for the filings pipeline.
//!
//! Every variant renders with a stable `CODE:` prefix so callers and
//! MCP clients can match on the class of failure.

use rmcp::model::{ErrorCode, ErrorData as McpError};

use crate::config::ConfigError;

/// Unified error types for the filings pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty subject).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A descriptor cannot be used to build a cache key or render request.
    #[error("INVALID_DESCRIPTOR: {0}")]
    InvalidDescriptor(String),

    /// Configuration could not be loaded or failed validation.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),

    /// Missing or rejected provider credential.
    #[error("AUTH_ERROR: {0}")]
    AuthError(String),

    /// Reading or writing the on-disk cache failed.
    #[error("CACHE_ERROR: {0}")]
    CacheIo(std::io::Error),

    /// A metadata sidecar could not be encoded or decoded.
    #[error("CACHE_ERROR: metadata: {0}")]
    CacheMetadata(String),

    /// The provider has no such document.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Fetching a rendered document failed.
    #[error("FETCH_FAILED: {0}")]
    FetchFailed(String),

    /// Resolving descriptors from the search service failed.
    #[error("SEARCH_FAILED: {0}")]
    SearchFailed(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::CacheIo(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::CacheMetadata(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidDescriptor(msg) => (-32602, msg.clone()),
            Error::Config(e) => (-32003, e.to_string()),
            Error::AuthError(msg) => (-32004, msg.clone()),
            Error::CacheIo(e) => (-32002, e.to_string()),
            Error::CacheMetadata(msg) => (-32002, msg.clone()),
            Error::NotFound(msg) => (-32001, msg.clone()),
            Error::FetchFailed(msg) => (-32005, msg.clone()),
            Error::SearchFailed(msg) => (-32006, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
