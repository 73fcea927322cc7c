use thiserror::Error;
use tracing::info;

use stocky_db::ProductStore;

use crate::dispatch::Dispatcher;
use crate::llm::{ChatClient, ChatMessage, LlmError, ModelTurn};
use crate::tools;

/// Final outcome of one user turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    /// Name of the operation that ran, if the model invoked one.
    pub invoked: Option<String>,
}

#[derive(Debug, Error)]
pub enum AgentError {
    /// The first model call failed: no answer is producible and no state
    /// changed. Distinct from the model simply choosing not to act.
    #[error("the model could not be reached and no action was taken: {0}")]
    ModelUnavailable(#[source] LlmError),
    /// The second model call failed after the operation already ran. When
    /// `mutated` is true the stock change is committed and stays committed;
    /// only the explanation is missing.
    #[error(
        "the `{operation}` operation was executed but the answer could not be generated: {source}"
    )]
    AnswerUnavailable {
        operation: String,
        mutated: bool,
        #[source]
        source: LlmError,
    },
}

/// Drives the two-round exchange with the model for a single user turn.
///
/// Round 1 offers the registry; the model either answers directly or
/// requests exactly one operation. Round 2 happens only after an invocation
/// and carries the serialized outcome back, with no registry advertisement,
/// so the design cannot loop into further operations.
///
/// Dispatcher failures (unknown operation, malformed or invalid arguments,
/// store-level refusals) are fed through round 2 like any success, so the
/// user receives a natural-language explanation rather than a hard stop.
pub struct Orchestrator<C, S> {
    client: C,
    dispatcher: Dispatcher<S>,
    language: String,
}

impl<C: ChatClient, S: ProductStore> Orchestrator<C, S> {
    pub fn new(client: C, dispatcher: Dispatcher<S>, language: impl Into<String>) -> Self {
        Self { client, dispatcher, language: language.into() }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are an inventory assistant for a small e-shop backed by a product database. \
             Use the find_product, list_low_stock and update_stock operations when they are needed. \
             Always answer in {}, briefly and clearly.",
            self.language
        )
    }

    pub async fn run_turn(&self, user_text: &str) -> Result<TurnReply, AgentError> {
        let mut messages = vec![
            ChatMessage::System(self.system_prompt()),
            ChatMessage::User(user_text.to_string()),
        ];

        let first = self
            .client
            .request_turn(&messages, Some(tools::descriptors()))
            .await
            .map_err(AgentError::ModelUnavailable)?;

        let request = match first {
            ModelTurn::DirectAnswer(text) => {
                info!(event_name = "agent.turn.direct_answer", "model answered without tools");
                return Ok(TurnReply { text, invoked: None });
            }
            ModelTurn::Invocation(request) => request,
        };

        info!(
            event_name = "agent.turn.invocation",
            operation = %request.operation,
            "model requested an operation"
        );

        let execution = self.dispatcher.execute(&request).await;
        info!(
            event_name = "agent.turn.dispatched",
            operation = %execution.operation,
            failed = execution.outcome.is_failure(),
            mutated = execution.mutated,
            "operation dispatched"
        );

        messages.push(ChatMessage::ToolCall {
            call_id: request.call_id.clone(),
            operation: request.operation.clone(),
            arguments: request.raw_arguments.clone(),
        });
        messages.push(ChatMessage::ToolResult {
            call_id: request.call_id,
            operation: execution.operation.clone(),
            payload: execution.outcome.payload().to_string(),
        });

        match self.client.request_turn(&messages, None).await {
            Ok(ModelTurn::DirectAnswer(text)) => {
                Ok(TurnReply { text, invoked: Some(execution.operation) })
            }
            // Round 2 advertises no operations; a second invocation request
            // is out of contract and ends the turn.
            Ok(ModelTurn::Invocation(extra)) => Err(AgentError::AnswerUnavailable {
                operation: execution.operation,
                mutated: execution.mutated,
                source: LlmError::ResponseFormat {
                    message: format!(
                        "model requested another operation (`{}`) after the tool result",
                        extra.operation
                    ),
                },
            }),
            Err(source) => Err(AgentError::AnswerUnavailable {
                operation: execution.operation,
                mutated: execution.mutated,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use stocky_core::domain::product::Product;
    use stocky_db::{InMemoryProductStore, ProductStore};

    use super::{AgentError, Orchestrator};
    use crate::dispatch::Dispatcher;
    use crate::llm::{ChatClient, ChatMessage, InvocationRequest, LlmError, ModelTurn};
    use crate::tools::OperationDescriptor;

    /// Scripted model capability: pops one response per call and records
    /// what it was asked.
    struct ScriptedClient {
        script: Mutex<Vec<Result<ModelTurn, LlmError>>>,
        seen: Mutex<Vec<(Vec<ChatMessage>, bool)>>,
    }

    impl ScriptedClient {
        fn new(mut responses: Vec<Result<ModelTurn, LlmError>>) -> Self {
            responses.reverse();
            Self { script: Mutex::new(responses), seen: Mutex::new(Vec::new()) }
        }

        fn calls(&self) -> Vec<(Vec<ChatMessage>, bool)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatClient for &ScriptedClient {
        async fn request_turn(
            &self,
            messages: &[ChatMessage],
            operations: Option<&[OperationDescriptor]>,
        ) -> Result<ModelTurn, LlmError> {
            self.seen.lock().unwrap().push((messages.to_vec(), operations.is_some()));
            self.script.lock().unwrap().pop().expect("script exhausted")
        }
    }

    fn store() -> InMemoryProductStore {
        InMemoryProductStore::new(vec![
            Product { id: 1, name: "iPhone 15".into(), price: 25_990.0, stock: 5 },
            Product { id: 2, name: "AirPods Pro".into(), price: 6_990.0, stock: 25 },
        ])
    }

    fn invocation(operation: &str, arguments: &str) -> ModelTurn {
        ModelTurn::Invocation(InvocationRequest {
            call_id: "call-1".to_string(),
            operation: operation.to_string(),
            raw_arguments: arguments.to_string(),
        })
    }

    fn tool_result_payload(messages: &[ChatMessage]) -> Value {
        let payload = messages
            .iter()
            .find_map(|message| match message {
                ChatMessage::ToolResult { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .expect("conversation should carry a tool-result turn");
        serde_json::from_str(&payload).expect("payload is JSON")
    }

    #[tokio::test]
    async fn direct_answer_ends_the_turn_verbatim() {
        let client = ScriptedClient::new(vec![Ok(ModelTurn::DirectAnswer("Hi there.".into()))]);
        let orchestrator = Orchestrator::new(&client, Dispatcher::new(store()), "English");

        let reply = orchestrator.run_turn("hello").await.expect("turn");
        assert_eq!(reply.text, "Hi there.");
        assert_eq!(reply.invoked, None);

        let calls = client.calls();
        assert_eq!(calls.len(), 1, "no second round without an invocation");
        assert!(calls[0].1, "round 1 must advertise the registry");
    }

    #[tokio::test]
    async fn invocation_feeds_result_into_second_round() {
        let client = ScriptedClient::new(vec![
            Ok(invocation("update_stock", r#"{"product_id": 2, "delta": -5}"#)),
            Ok(ModelTurn::DirectAnswer("AirPods Pro now has 20 units.".into())),
        ]);
        let orchestrator = Orchestrator::new(&client, Dispatcher::new(store()), "English");

        let reply = orchestrator.run_turn("sell five airpods").await.expect("turn");
        assert_eq!(reply.text, "AirPods Pro now has 20 units.");
        assert_eq!(reply.invoked.as_deref(), Some("update_stock"));

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert!(!calls[1].1, "round 2 must not advertise the registry");

        let payload = tool_result_payload(&calls[1].0);
        assert_eq!(payload["success"], Value::Bool(true));
        assert_eq!(payload["product"]["stock"], serde_json::json!(20));
    }

    #[tokio::test]
    async fn unknown_operation_failure_still_reaches_round_two() {
        let client = ScriptedClient::new(vec![
            Ok(invocation("drop_table", "{}")),
            Ok(ModelTurn::DirectAnswer("I cannot do that.".into())),
        ]);
        let orchestrator = Orchestrator::new(&client, Dispatcher::new(store()), "English");

        let reply = orchestrator.run_turn("drop everything").await.expect("turn");
        assert_eq!(reply.text, "I cannot do that.");

        let payload = tool_result_payload(&client.calls()[1].0);
        assert_eq!(payload["error"], serde_json::json!("unknown_operation"));
    }

    #[tokio::test]
    async fn malformed_arguments_failure_still_reaches_round_two() {
        let client = ScriptedClient::new(vec![
            Ok(invocation("find_product", "{ not json")),
            Ok(ModelTurn::DirectAnswer("The request did not parse.".into())),
        ]);
        let orchestrator = Orchestrator::new(&client, Dispatcher::new(store()), "English");

        let reply = orchestrator.run_turn("find it").await.expect("turn");
        assert_eq!(reply.invoked.as_deref(), Some("find_product"));

        let payload = tool_result_payload(&client.calls()[1].0);
        assert_eq!(payload["error"], serde_json::json!("malformed_arguments"));
    }

    #[tokio::test]
    async fn round_one_failure_is_fatal_and_touches_nothing() {
        let client =
            ScriptedClient::new(vec![Err(LlmError::Timeout { elapsed_secs: 60 })]);
        let store = store();
        let orchestrator = Orchestrator::new(&client, Dispatcher::new(&store), "English");

        let error = orchestrator.run_turn("hello").await.expect_err("should fail");
        assert!(matches!(error, AgentError::ModelUnavailable(_)));

        let untouched = store.find_by_name_substring("AirPods").await.expect("find");
        assert_eq!(untouched[0].stock, 25, "no store access may happen on round-1 failure");
    }

    #[tokio::test]
    async fn round_two_failure_after_mutation_reports_partial_success() {
        let client = ScriptedClient::new(vec![
            Ok(invocation("update_stock", r#"{"product_id": 2, "delta": -5}"#)),
            Err(LlmError::Transport("connection reset".into())),
        ]);
        let store = store();
        let orchestrator = Orchestrator::new(&client, Dispatcher::new(&store), "English");

        let error = orchestrator.run_turn("sell five airpods").await.expect_err("should fail");
        match error {
            AgentError::AnswerUnavailable { operation, mutated, .. } => {
                assert_eq!(operation, "update_stock");
                assert!(mutated, "the committed mutation must be reported");
            }
            other => panic!("unexpected error: {other}"),
        }

        let committed = store.find_by_name_substring("AirPods").await.expect("find");
        assert_eq!(committed[0].stock, 20, "mutation stays committed after round-2 failure");
    }

    #[tokio::test]
    async fn round_two_failure_after_read_reports_no_mutation() {
        let client = ScriptedClient::new(vec![
            Ok(invocation("find_product", r#"{"name": "iPhone"}"#)),
            Err(LlmError::EmptyResponse),
        ]);
        let orchestrator = Orchestrator::new(&client, Dispatcher::new(store()), "English");

        let error = orchestrator.run_turn("find iphone").await.expect_err("should fail");
        assert!(matches!(
            error,
            AgentError::AnswerUnavailable { mutated: false, .. }
        ));
    }

    #[tokio::test]
    async fn second_invocation_request_is_out_of_contract() {
        let client = ScriptedClient::new(vec![
            Ok(invocation("find_product", r#"{"name": "iPhone"}"#)),
            Ok(invocation("find_product", r#"{"name": "MacBook"}"#)),
        ]);
        let orchestrator = Orchestrator::new(&client, Dispatcher::new(store()), "English");

        let error = orchestrator.run_turn("find things").await.expect_err("should fail");
        assert!(matches!(
            error,
            AgentError::AnswerUnavailable { source: LlmError::ResponseFormat { .. }, .. }
        ));
        assert_eq!(client.calls().len(), 2, "the design never loops back into round 1");
    }

    #[tokio::test]
    async fn system_prompt_carries_configured_language() {
        let client = ScriptedClient::new(vec![Ok(ModelTurn::DirectAnswer("Ahoj.".into()))]);
        let orchestrator = Orchestrator::new(&client, Dispatcher::new(store()), "Czech");

        orchestrator.run_turn("ahoj").await.expect("turn");

        let calls = client.calls();
        match &calls[0].0[0] {
            ChatMessage::System(prompt) => assert!(prompt.contains("Czech")),
            other => panic!("first turn should be the system instruction, got {other:?}"),
        }
    }
}
