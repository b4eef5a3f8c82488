//! Interpretation of streamed completion chunks.
//!
//! Each payload is expected to look like
//! `{"choices":[{"delta":{...},"message":{...},"finish_reason":"..."}]}`.
//! Fields on `delta` take precedence over the same fields on `message`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::types::ToolCall;

/// Why the model stopped emitting the current turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    EndTurn,
    ToolCalls,
    Length,
    Other(String),
}

impl FinishReason {
    fn parse(raw: &str) -> Self {
        match raw {
            "stop" => Self::Stop,
            "end_turn" => Self::EndTurn,
            "tool_calls" => Self::ToolCalls,
            "length" => Self::Length,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether this reason closes the turn.
    #[must_use]
    pub const fn is_end_of_turn(&self) -> bool {
        matches!(self, Self::Stop | Self::EndTurn)
    }
}

/// One interpreted delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub finish_reason: Option<FinishReason>,
}

impl Delta {
    /// A content-only delta.
    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    /// A tool-call delta.
    #[must_use]
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::default()
        }
    }

    /// A delta carrying only a finish reason.
    #[must_use]
    pub fn finish(reason: &str) -> Self {
        Self {
            finish_reason: Some(FinishReason::parse(reason)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_content(mut self, text: impl Into<String>) -> Self {
        self.content = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_reasoning(mut self, text: impl Into<String>) -> Self {
        self.reasoning = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_finish(mut self, reason: &str) -> Self {
        self.finish_reason = Some(FinishReason::parse(reason));
        self
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Option<Vec<Option<Choice>>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<ChoicePayload>,
    #[serde(default)]
    message: Option<ChoicePayload>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChoicePayload {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<ReasoningPayload>,
    #[serde(default, deserialize_with = "tool_call_list")]
    tool_calls: Option<Vec<ToolCall>>,
}

/// Tool calls never fail a frame: entries that are not call objects are
/// dropped, and a non-list value reads as absent.
fn tool_call_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<ToolCall>>, D::Error> {
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };

    Ok(Some(
        entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect(),
    ))
}

impl ChoicePayload {
    fn is_tool_role(&self) -> bool {
        self.role.as_deref() == Some("tool")
    }

    fn content(&mut self) -> Option<String> {
        self.content.take().filter(|s| !s.is_empty())
    }

    fn thinking(&mut self) -> Option<String> {
        self.reasoning
            .as_mut()
            .and_then(|r| r.thinking.take())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ReasoningPayload {
    #[serde(default)]
    thinking: Option<String>,
}

/// Interpret one frame payload.
///
/// Returns `None` for frames that carry nothing for the reducer: malformed
/// JSON, missing choices, and raw tool-role frames. Never fails.
#[must_use]
pub fn interpret(payload: &str) -> Option<Delta> {
    let chunk = match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            if is_keepalive(payload) {
                tracing::trace!(data = %payload, "skipping keepalive frame");
            } else {
                tracing::warn!(data = %payload, error = %e, "failed to parse stream chunk");
            }
            return None;
        }
    };

    let Some(choices) = chunk.choices.filter(|c| !c.is_empty()) else {
        tracing::warn!("invalid chunk structure: missing or empty choices array");
        return None;
    };

    let Some(choice) = choices.into_iter().next().flatten() else {
        tracing::warn!("invalid chunk structure: no choice at index 0");
        return None;
    };

    let mut delta = choice.delta.unwrap_or_default();
    let mut message = choice.message.unwrap_or_default();

    if delta.is_tool_role() || message.is_tool_role() {
        tracing::trace!("skipping tool-role frame");
        return None;
    }

    Some(Delta {
        content: delta.content().or_else(|| message.content()),
        reasoning: delta.thinking().or_else(|| message.thinking()),
        tool_calls: delta.tool_calls.take().or_else(|| message.tool_calls.take()),
        finish_reason: choice.finish_reason.as_deref().map(FinishReason::parse),
    })
}

fn is_keepalive(payload: &str) -> bool {
    let payload = payload.trim();
    payload.is_empty() || payload.contains("heartbeat") || payload.contains("ping")
}
