//! Chat error types.

/// Errors raised while running a chat turn.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status.
    ///
    /// `message` is the human-readable text pulled from the error body.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// Response body failed while it was being read.
    #[error("stream error: {0}")]
    Stream(String),

    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl ChatError {
    /// Build an API error from a non-success status and its raw body.
    ///
    /// The message comes from the JSON `details` field, then `error`, and
    /// falls back to a generic status line when neither is usable.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                ["details", "error"].iter().find_map(|key| {
                    value
                        .get(*key)
                        .and_then(serde_json::Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                })
            })
            .unwrap_or_else(|| format!("Request failed with status {status}"));

        Self::Api { status, message }
    }
}

/// Result type for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;
