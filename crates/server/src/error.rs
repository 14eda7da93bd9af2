//! Structured errors for the mcp-filings tool layer.
//!
//! Pipeline failures arrive as `filings_core::Error`; these cover mistakes
//! caught before the pipeline is involved.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Structured errors for the mcp-filings tool layer.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid tool parameters (e.g., an empty descriptor list).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The tool output could not be encoded.
    #[error("OUTPUT_ERROR: {0}")]
    Output(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(msg) => (-32602, msg.clone()),
            ToolError::Output(msg) => (-32603, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
