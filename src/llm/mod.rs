//! LLM module - conversation types and the completion client abstraction.
//!
//! A completion call takes the ordered conversation history plus the
//! advertised tool schemas and yields either a final text answer or a
//! request to run one or more tools.

mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Fetch a string argument by name.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// The outcome of running a tool, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub name: String,
    pub payload: String,
}

/// Body of a conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    ToolCalls { calls: Vec<ToolCallRequest> },
    ToolResults { results: Vec<ToolCallResult> },
}

/// One entry of the append-only conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text { text: text.into() },
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: MessageContent::Text { text: text.into() },
        }
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Model,
            content: MessageContent::ToolCalls { calls },
        }
    }

    pub fn tool_results(results: Vec<ToolCallResult>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResults { results },
        }
    }

    /// Plain text of the message, if it carries any.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Declaration of a callable tool, advertised with each completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Parsed completion response.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionResult {
    /// The model produced its answer.
    FinalText(String),
    /// The model wants these tools run before it continues. Never empty.
    ToolCalls(Vec<ToolCallRequest>),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompletionError {
    /// Zero candidates, or a candidate without any content parts.
    #[error("completion returned no usable candidate")]
    EmptyCompletion,

    /// Authentication, transport, timeout or response-shape failure.
    #[error("completion failed: {0}")]
    Failed(String),
}

/// A chat-completion endpoint.
///
/// Implementations issue exactly one request per call and never retry.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        history: &[ConversationMessage],
        tools: &[ToolSchema],
    ) -> Result<CompletionResult, CompletionError>;
}
