//! Agent runtime - the dispatch loop and tool contract layer.
//!
//! This crate is the "brain" of the stocky system. One user turn flows
//! through it as:
//!
//! 1. **Registry advertisement** (`tools`) - the three fixed operations,
//!    described once and validated against the same source of truth.
//! 2. **Model round 1** (`llm`, `openai`) - the model either answers
//!    directly or requests exactly one operation.
//! 3. **Dispatch** (`dispatch`) - the invocation request is validated and
//!    routed to the product store; every failure becomes a structured
//!    result, never a propagated fault.
//! 4. **Model round 2** (`conversation`) - the serialized outcome is folded
//!    back into the conversation and the model composes the final answer.
//!
//! # Safety principle
//!
//! The model decides *which* operation runs, never *whether the store
//! invariants hold*. Stock can only change through the store's guarded
//! adjustment, and the dispatcher refuses anything the registry does not
//! advertise.

pub mod conversation;
pub mod dispatch;
pub mod llm;
pub mod openai;
pub mod tools;

pub use conversation::{AgentError, Orchestrator, TurnReply};
pub use dispatch::{Dispatcher, Execution, FailureKind, OperationOutcome};
pub use llm::{ChatClient, ChatMessage, InvocationRequest, LlmError, ModelTurn};
pub use openai::OpenAiClient;
