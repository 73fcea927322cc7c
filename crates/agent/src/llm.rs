use async_trait::async_trait;
use thiserror::Error;

use crate::tools::OperationDescriptor;

/// One turn in the conversation sent to the model capability.
///
/// Plain assistant answers are terminal for a user turn and are never
/// appended, so they have no variant here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatMessage {
    System(String),
    User(String),
    /// Assistant turn echoing the operation the model requested.
    ToolCall { call_id: String, operation: String, arguments: String },
    /// Labeled tool-result turn carrying the serialized operation outcome.
    ToolResult { call_id: String, operation: String, payload: String },
}

/// The model's structured request to run one operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationRequest {
    /// Provider-assigned call id, echoed back with the tool result.
    pub call_id: String,
    pub operation: String,
    /// Opaque argument text; expected (but not guaranteed) to decode to a
    /// JSON object. Decoding is the dispatcher's job.
    pub raw_arguments: String,
}

/// What the model did with a request: answered directly, or asked for
/// exactly one operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelTurn {
    DirectAnswer(String),
    Invocation(InvocationRequest),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication with the model provider failed: {0}")]
    Auth(String),
    #[error("could not reach the model endpoint: {0}")]
    Transport(String),
    #[error("model endpoint returned status {status}: {message}")]
    Http { status: u16, message: String },
    #[error("model request timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },
    #[error("could not parse model response: {message}")]
    ResponseFormat { message: String },
    #[error("model returned no usable choice")]
    EmptyResponse,
}

/// Opaque model capability: given conversation turns and an optional set of
/// callable-operation descriptors, return either a direct answer or exactly
/// one requested operation. Calls are blocking request/response exchanges
/// and are never retried internally.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn request_turn(
        &self,
        messages: &[ChatMessage],
        operations: Option<&[OperationDescriptor]>,
    ) -> Result<ModelTurn, LlmError>;
}
