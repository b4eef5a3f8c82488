//! Upstream inference client.
//!
//! Translates portal chat requests into Heroku inference requests. Requests
//! with tools go to the agents endpoint, everything else to chat completions
//! with streaming enabled. Both answer with an SSE body that is handed back
//! untouched.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use super::tools::McpServer;
use crate::config::{Config, RuntimeParams};

const THINKING_BUDGET_TOKENS: u32 = 2000;

/// A message in an incoming chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProxyMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    pub content: String,
}

/// A tool requested by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProxyTool {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// `heroku` or `mcp`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
}

/// Incoming chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProxyChatRequest {
    pub messages: Vec<ProxyMessage>,
    pub model: String,

    #[serde(default)]
    pub reasoning: bool,

    #[serde(default)]
    pub tools: Vec<ProxyTool>,
}

/// Tool entry forwarded to the agents endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamTool {
    #[serde(rename = "type")]
    pub tool_type: String,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_params: Option<RuntimeParams>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendedThinking {
    pub enabled: bool,
    pub budget_tokens: u32,
    pub include_reasoning: bool,
}

/// Body sent to the inference service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamBody {
    pub model: String,
    pub messages: Vec<ProxyMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<UpstreamTool>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_thinking: Option<ExtendedThinking>,
}

/// Fully resolved upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub url: String,
    pub body: UpstreamBody,
}

/// Build the upstream call for an incoming chat request.
///
/// # Errors
///
/// Returns [`Error::InvalidModel`] if the model is not a configured chat model.
pub fn build_upstream(config: &Config, request: &ProxyChatRequest) -> Result<UpstreamRequest> {
    let model = config
        .chat_model(&request.model)
        .ok_or_else(|| Error::InvalidModel(request.model.clone()))?;

    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(ProxyMessage {
        role: "system".to_string(),
        content: config.inference.system_prompt.clone(),
    });
    messages.extend(request.messages.iter().cloned());

    let mut body = UpstreamBody {
        model: config.upstream_model_id(&request.model),
        messages,
        stream: None,
        tools: None,
        extended_thinking: None,
    };

    let base = config.inference.base_url();

    if request.tools.is_empty() {
        body.stream = Some(true);
        if model.reasoning && request.reasoning {
            body.extended_thinking = Some(ExtendedThinking {
                enabled: true,
                budget_tokens: THINKING_BUDGET_TOKENS,
                include_reasoning: true,
            });
        }

        return Ok(UpstreamRequest {
            url: format!("{base}/v1/chat/completions"),
            body,
        });
    }

    body.tools = Some(
        request
            .tools
            .iter()
            .filter_map(|tool| upstream_tool(config, tool))
            .collect(),
    );

    Ok(UpstreamRequest {
        url: format!("{base}/v1/agents/heroku"),
        body,
    })
}

fn upstream_tool(config: &Config, tool: &ProxyTool) -> Option<UpstreamTool> {
    if let Some(known) = config.tools.get(&tool.name) {
        let mut params = known.runtime_params.clone();
        params
            .target_app_name
            .get_or_insert_with(|| config.inference.target_app_name.clone());

        return Some(UpstreamTool {
            tool_type: known.tool_type.clone(),
            name: known.name.clone(),
            description: None,
            runtime_params: Some(params),
        });
    }

    if tool.tool_type.as_deref() == Some("mcp") {
        return Some(UpstreamTool {
            tool_type: "mcp".to_string(),
            name: tool.name.clone(),
            description: tool.description.clone(),
            runtime_params: None,
        });
    }

    tracing::warn!(tool = %tool.name, "unknown tool type, skipping");
    None
}

/// Pull the upstream error message out of an error body.
fn upstream_details(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(serde_json::Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
        .unwrap_or_else(|| "Unknown error".to_string())
}

/// Client for the inference service.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    config: Config,
}

impl InferenceClient {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &self.config.inference.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {api_key}"))
                    .map_err(|_| Error::InvalidApiKey)?,
            );
        }

        Ok(headers)
    }

    /// Send a chat request upstream and return the streaming response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModel`] for unknown models, [`Error::Upstream`]
    /// for non-success statuses, and [`Error::Http`] if the request fails.
    pub async fn stream_chat(&self, request: &ProxyChatRequest) -> Result<reqwest::Response> {
        let upstream = build_upstream(&self.config, request)?;
        let tools = upstream.body.tools.as_ref().map_or(0, Vec::len);

        tracing::info!(
            url = %upstream.url,
            model = %upstream.body.model,
            messages = upstream.body.messages.len(),
            tools,
            "forwarding chat request"
        );

        let mut headers = self.headers()?;
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let response = self
            .http
            .post(&upstream.url)
            .headers(headers)
            .json(&upstream.body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "error from model");
            return Err(Error::Upstream {
                status: status.as_u16(),
                details: upstream_details(&body),
            });
        }

        Ok(response)
    }

    /// List MCP servers registered with the inference service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::McpServers`] if the listing cannot be fetched or parsed.
    pub async fn list_mcp_servers(&self) -> Result<Vec<McpServer>> {
        let url = format!("{}/v1/mcp/servers", self.config.inference.base_url());

        let response = self
            .http
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| Error::McpServers(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::McpServers(format!("status {status}")));
        }

        response
            .json::<Vec<McpServer>>()
            .await
            .map_err(|e| Error::McpServers(e.to_string()))
    }
}
