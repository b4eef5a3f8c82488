//! Error types for the inference proxy.

/// Proxy error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Requested model is not a configured chat model.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// Upstream answered with a non-success status.
    #[error("upstream returned {status}: {details}")]
    Upstream { status: u16, details: String },

    /// MCP server listing failed.
    #[error("failed to fetch MCP servers: {0}")]
    McpServers(String),

    /// Configured API key cannot be sent as a header.
    #[error("inference API key is not a valid header value")]
    InvalidApiKey,

    /// HTTP request to the upstream failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, Error>;
