//! Error types for the troupe domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own error enum; the top-level [`Error`] folds them together.
//!
//! Per-tool-call problems (missing tool, bad arguments, execution failure)
//! are NOT run-fatal — the engine folds those into the conversation as
//! tool-role messages so the model can react to them. Only provider
//! failures and genuine programming errors escape a run.

use thiserror::Error;

/// The top-level error type for all troupe operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the completion provider. These propagate out of a run
/// unchanged; retry/backoff is the caller's responsibility.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors raised by tool implementations or their dispatch.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// A tool produced a value that cannot be coerced into a tool result.
    /// This is a programming error in the tool, distinct from a normal
    /// execution failure.
    #[error("Tool returned an unsupported value: {tool_name} — {reason}")]
    BadReturnValue { tool_name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::BadReturnValue {
            tool_name: "weather".into(),
            reason: "value is not JSON-serializable".into(),
        });
        assert!(err.to_string().contains("weather"));
        assert!(err.to_string().contains("unsupported value"));
    }
}
