//! Transport abstraction for chat requests.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::types::{Message, Role};

/// A history entry as sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for OutgoingMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Where a requested tool comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSource {
    Heroku,
    Mcp,
}

/// A tool the model may use during the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRef {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ToolSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ToolRef {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            description: None,
        }
    }
}

/// Body of a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<OutgoingMessage>,
    pub model: String,
    #[serde(default)]
    pub reasoning: bool,
    #[serde(default)]
    pub tools: Vec<ToolRef>,
}

/// Raw response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Sends a chat request and hands back the streamed response body.
///
/// Implementations must return [`ChatError::Api`] for non-success statuses so
/// the controller can surface the server's message.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: ChatRequest) -> Result<ByteStream>;
}

/// Transport that posts to an HTTP chat endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a transport for the given endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is empty.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Create a transport reusing an existing HTTP client.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is empty.
    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(ChatError::Config("chat endpoint is empty".to_string()));
        }

        Ok(Self {
            http,
            endpoint,
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: ChatRequest) -> Result<ByteStream> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                ChatError::Config("API token is not a valid header value".to_string())
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending chat request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .headers(headers)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::from_status(status.as_u16(), &body));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ChatError::Stream(e.to_string())));

        Ok(Box::pin(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_endpoint() {
        assert!(matches!(HttpTransport::new("  "), Err(ChatError::Config(_))));
    }

    #[test]
    fn keeps_endpoint() {
        let transport = HttpTransport::new("http://localhost:3000/api/heroku-mia").unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:3000/api/heroku-mia");
    }

    #[test]
    fn request_serializes_wire_shape() {
        let request = ChatRequest {
            messages: vec![OutgoingMessage::from(&Message::user("hi"))],
            model: "claude-4-sonnet".to_string(),
            reasoning: true,
            tools: vec![
                ToolRef::named("code_exec_python"),
                ToolRef {
                    name: "mcp_srv/lookup".to_string(),
                    source: Some(ToolSource::Mcp),
                    description: Some("Look things up".to_string()),
                },
            ],
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "messages": [{"role": "user", "content": "hi"}],
                "model": "claude-4-sonnet",
                "reasoning": true,
                "tools": [
                    {"name": "code_exec_python"},
                    {"name": "mcp_srv/lookup", "type": "mcp", "description": "Look things up"}
                ]
            })
        );
    }
}
