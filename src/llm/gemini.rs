//! Google Gemini `generateContent` client.
//!
//! The API key travels in the `x-goog-api-key` header, never in the URL, so
//! request URLs are safe to log.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    CompletionError, CompletionResult, ConversationMessage, LlmClient, MessageContent, Role,
    ToolCallRequest, ToolSchema,
};
use crate::config::{Config, GenerationConfig};

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    generation: GenerationConfig,
    timeout: Duration,
}

impl GeminiClient {
    /// Build a client from the service configuration.
    pub fn from_config(config: &Config) -> Result<Self, CompletionError> {
        Self::new(
            config.api_key.clone(),
            config.base_url.clone(),
            config.model.clone(),
            config.generation.clone(),
            config.request_timeout,
        )
    }

    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        generation: GenerationConfig,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Failed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            generation,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn send_request(&self, request: &GeminiRequest<'_>) -> Result<GeminiResponse, CompletionError> {
        let url = self.endpoint();
        tracing::debug!(url = %url, messages = request.contents.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Failed(format!(
                "Gemini API error ({}): {}",
                status,
                api_error_message(&body)
            )));
        }

        response
            .json::<GeminiResponse>()
            .await
            .map_err(|e| CompletionError::Failed(format!("malformed Gemini response: {}", e)))
    }

    fn transport_error(&self, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::Failed(format!(
                "request timed out after {}ms",
                self.timeout.as_millis()
            ))
        } else {
            CompletionError::Failed(format!("failed to reach Gemini API: {}", e))
        }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(
        &self,
        history: &[ConversationMessage],
        tools: &[ToolSchema],
    ) -> Result<CompletionResult, CompletionError> {
        let request = GeminiRequest {
            contents: history.iter().map(to_gemini_content).collect(),
            tools: (!tools.is_empty()).then(|| {
                vec![GeminiTools {
                    function_declarations: tools,
                }]
            }),
            generation_config: &self.generation,
        };

        let response = self.send_request(&request).await?;
        parse_response(response)
    }
}

/// Pull `error.message` out of an API error body, falling back to the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn to_gemini_content(message: &ConversationMessage) -> GeminiContent {
    let role = match message.role {
        Role::User => "user",
        Role::Model => "model",
        Role::Tool => "function",
    };

    let parts = match &message.content {
        MessageContent::Text { text } => vec![GeminiPart::Text { text: text.clone() }],
        MessageContent::ToolCalls { calls } => calls
            .iter()
            .map(|call| GeminiPart::FunctionCall {
                function_call: GeminiFunctionCall {
                    name: call.name.clone(),
                    args: Value::Object(call.arguments.clone()),
                },
            })
            .collect(),
        MessageContent::ToolResults { results } => results
            .iter()
            .map(|result| GeminiPart::FunctionResponse {
                function_response: GeminiFunctionResponse {
                    name: result.name.clone(),
                    response: serde_json::json!({ "content": result.payload }),
                },
            })
            .collect(),
    };

    GeminiContent {
        role: Some(role.to_string()),
        parts,
    }
}

/// Interpret the first candidate of a response.
fn parse_response(response: GeminiResponse) -> Result<CompletionResult, CompletionError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(CompletionError::EmptyCompletion)?;

    let parts = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default();
    if parts.is_empty() {
        return Err(CompletionError::EmptyCompletion);
    }

    let mut text = String::new();
    let mut calls = Vec::new();
    for part in parts {
        match part {
            GeminiPart::Text { text: t } => text.push_str(&t),
            GeminiPart::FunctionCall { function_call } => {
                let arguments = match function_call.args {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                calls.push(ToolCallRequest::new(function_call.name, arguments));
            }
            GeminiPart::FunctionResponse { .. } | GeminiPart::Other(_) => {}
        }
    }

    if !calls.is_empty() {
        Ok(CompletionResult::ToolCalls(calls))
    } else {
        Ok(CompletionResult::FinalText(text))
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTools<'a>>>,
    generation_config: &'a GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools<'a> {
    function_declarations: &'a [ToolSchema],
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}
