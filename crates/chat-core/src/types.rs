//! Conversation types shared by the reducer, controller, and facade.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Tool-execution narration.
    Agent,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Agent => "agent",
        }
    }
}

/// What a message carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    /// Generated image spliced in by a sibling feature. Never sent upstream.
    Image,
}

/// Side-channel "thinking" text attached to an assistant answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reasoning {
    pub thinking: String,
}

/// Function payload of a tool call.
///
/// Providers disagree on shapes here, so a non-string `name` reads as absent
/// and `arguments` is kept as raw JSON (a string fragment or an object).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// A tool invocation reported by the model.
///
/// `id` is the identity key: a call already present by id is never re-added.
/// Numeric ids are read as their decimal text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub call_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "function_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub function: Option<FunctionCall>,
}

fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(id) => id,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn string_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

fn function_or_none<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<FunctionCall>, D::Error> {
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

impl ToolCall {
    /// Create a bare tool call with only an id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Function name, if reported.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.function.as_ref()?.name.as_deref()
    }

    /// Arguments received so far, if any.
    #[must_use]
    pub fn arguments(&self) -> Option<&Value> {
        self.function.as_ref()?.arguments.as_ref()
    }
}

/// An entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_tool_message: bool,

    #[serde(default, rename = "type")]
    pub kind: MessageKind,
}

impl Message {
    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            reasoning: None,
            tool_calls: None,
            is_tool_message: false,
            kind: MessageKind::Text,
        }
    }

    /// An assistant answer. Blank reasoning is dropped.
    #[must_use]
    pub fn assistant(content: impl Into<String>, reasoning: &str) -> Self {
        let reasoning = (!reasoning.trim().is_empty()).then(|| Reasoning {
            thinking: reasoning.to_string(),
        });

        Self {
            role: Role::Assistant,
            content: content.into(),
            reasoning,
            tool_calls: None,
            is_tool_message: false,
            kind: MessageKind::Text,
        }
    }

    /// Tool-execution narration.
    #[must_use]
    pub fn agent(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
            reasoning: None,
            tool_calls: Some(tool_calls),
            is_tool_message: true,
            kind: MessageKind::Text,
        }
    }

    /// An image result. `content` holds the image reference (URL or data URI).
    #[must_use]
    pub fn image(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            reasoning: None,
            tool_calls: None,
            is_tool_message: false,
            kind: MessageKind::Image,
        }
    }

    /// Whether this entry may be sent back to the model.
    ///
    /// Agent narration, image results, and blank entries stay local.
    #[must_use]
    pub fn is_sendable(&self) -> bool {
        self.kind != MessageKind::Image
            && self.role != Role::Agent
            && !self.content.trim().is_empty()
    }
}

/// Lifecycle status of the chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Idle,
    Loading,
    Error,
}

/// User-facing error from the last turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestError {
    pub message: String,
}

impl RequestError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
