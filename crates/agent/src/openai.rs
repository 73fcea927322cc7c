//! OpenAI-compatible chat-completions client.
//!
//! Wire types mirror the provider's request/response format and stay private
//! to this module; the rest of the crate only sees [`ChatClient`],
//! [`ModelTurn`] and [`LlmError`].

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use stocky_core::config::LlmConfig;

use crate::llm::{ChatClient, ChatMessage, InvocationRequest, LlmError, ModelTurn};
use crate::tools::OperationDescriptor;

pub struct OpenAiClient {
    api_key: SecretString,
    base_url: String,
    model: String,
    timeout_secs: u64,
    http: reqwest::Client,
}

impl OpenAiClient {
    /// Build a client from the `[llm]` configuration section. Fails when no
    /// API key is configured or the HTTP client cannot be constructed.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Auth("no API key configured".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            http,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn request_turn(
        &self,
        messages: &[ChatMessage],
        operations: Option<&[OperationDescriptor]>,
    ) -> Result<ModelTurn, LlmError> {
        let body = build_request(&self.model, messages, operations);

        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    LlmError::Timeout { elapsed_secs: self.timeout_secs }
                } else {
                    LlmError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Auth(format!("provider rejected the API key: {message}")));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Http { status: status.as_u16(), message });
        }

        let raw = response
            .text()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;
        let parsed: Response = serde_json::from_str(&raw).map_err(|error| {
            LlmError::ResponseFormat { message: format!("invalid completion body: {error}") }
        })?;

        turn_from_response(parsed)
    }
}

fn build_request<'a>(
    model: &'a str,
    messages: &[ChatMessage],
    operations: Option<&[OperationDescriptor]>,
) -> Request<'a> {
    Request {
        model,
        messages: messages.iter().map(wire_message).collect(),
        tools: operations
            .map(|descriptors| descriptors.iter().map(wire_tool).collect::<Vec<_>>()),
        tool_choice: operations.map(|_| Value::String("auto".to_string())),
    }
}

fn wire_message(message: &ChatMessage) -> Message {
    match message {
        ChatMessage::System(text) => Message {
            role: "system",
            content: Some(text.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        ChatMessage::User(text) => Message {
            role: "user",
            content: Some(text.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        ChatMessage::ToolCall { call_id, operation, arguments } => Message {
            role: "assistant",
            content: None,
            tool_calls: Some(vec![ToolCallRequest {
                id: call_id.clone(),
                call_type: "function",
                function: FunctionCallRequest {
                    name: operation.clone(),
                    arguments: arguments.clone(),
                },
            }]),
            tool_call_id: None,
        },
        ChatMessage::ToolResult { call_id, payload, .. } => Message {
            role: "tool",
            content: Some(payload.clone()),
            tool_calls: None,
            tool_call_id: Some(call_id.clone()),
        },
    }
}

fn wire_tool(descriptor: &OperationDescriptor) -> Tool {
    Tool {
        tool_type: "function",
        function: FunctionDef {
            name: descriptor.name,
            description: descriptor.description,
            parameters: descriptor.schema_json(),
        },
    }
}

/// Fold a provider response into the tagged turn the orchestrator matches
/// on. The single-invocation contract takes the first tool call; a response
/// with neither content nor tool calls is unusable.
fn turn_from_response(response: Response) -> Result<ModelTurn, LlmError> {
    let choice = response.choices.into_iter().next().ok_or(LlmError::EmptyResponse)?;

    if let Some(call) = choice.message.tool_calls.into_iter().flatten().next() {
        return Ok(ModelTurn::Invocation(InvocationRequest {
            call_id: call.id,
            operation: call.function.name,
            raw_arguments: call.function.arguments,
        }));
    }

    match choice.message.content {
        Some(text) => Ok(ModelTurn::DirectAnswer(text)),
        None => Err(LlmError::EmptyResponse),
    }
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Request<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToolCallRequest {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: FunctionCallRequest,
}

#[derive(Debug, Serialize)]
struct FunctionCallRequest {
    name: String,
    /// JSON string of the arguments, passed through opaquely.
    arguments: String,
}

#[derive(Debug, Serialize)]
struct Tool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: FunctionDef,
}

#[derive(Debug, Serialize)]
struct FunctionDef {
    name: &'static str,
    description: &'static str,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct Response {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallResponse>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallResponse {
    id: String,
    function: FunctionCallResponse,
}

#[derive(Debug, Deserialize)]
struct FunctionCallResponse {
    name: String,
    arguments: String,
}
