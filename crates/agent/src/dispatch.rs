use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use stocky_core::domain::product::Product;
use stocky_db::{ProductStore, StoreError};

use crate::llm::InvocationRequest;
use crate::tools::{self, OperationDescriptor};

/// Why an operation did not produce a success payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    UnknownOperation,
    MalformedArguments,
    InvalidArguments,
    NotFound,
    InvalidAdjustment,
    StoreUnavailable,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownOperation => "unknown_operation",
            Self::MalformedArguments => "malformed_arguments",
            Self::InvalidArguments => "invalid_arguments",
            Self::NotFound => "not_found",
            Self::InvalidAdjustment => "invalid_adjustment",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

/// Structured outcome of executing one invocation request. Success payloads
/// are operation-specific; failures carry a human-readable message the model
/// can explain to the user. Either way the outcome serializes to a flat JSON
/// object for re-injection into the conversation.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationOutcome {
    Success(Value),
    Failure { kind: FailureKind, message: String },
}

impl OperationOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::Success(payload) => payload.clone(),
            Self::Failure { kind, message } => json!({
                "success": false,
                "error": kind.as_str(),
                "message": message,
            }),
        }
    }
}

/// One dispatched invocation: which operation ran (as requested), what came
/// back, and whether a durable write was committed.
#[derive(Clone, Debug)]
pub struct Execution {
    pub operation: String,
    pub outcome: OperationOutcome,
    pub mutated: bool,
}

impl Execution {
    fn failed(operation: &str, kind: FailureKind, message: String) -> Self {
        Self {
            operation: operation.to_string(),
            outcome: OperationOutcome::Failure { kind, message },
            mutated: false,
        }
    }
}

/// Validates the model's invocation request against the registry and routes
/// it to the store. Never raises to its caller: every failure path is a
/// typed outcome the orchestrator can feed back to the model uniformly.
pub struct Dispatcher<S> {
    store: S,
}

impl<S: ProductStore> Dispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn execute(&self, request: &InvocationRequest) -> Execution {
        let Some(descriptor) = tools::resolve(&request.operation) else {
            warn!(operation = %request.operation, "model requested an unknown operation");
            return Execution::failed(
                &request.operation,
                FailureKind::UnknownOperation,
                format!("`{}` is not an available operation.", request.operation),
            );
        };

        // Decode and validate before any store access.
        let arguments = match decode_arguments(&request.raw_arguments) {
            Ok(arguments) => arguments,
            Err(message) => {
                return Execution::failed(
                    descriptor.name,
                    FailureKind::MalformedArguments,
                    message,
                );
            }
        };

        if let Err(message) = validate_arguments(descriptor, &arguments) {
            return Execution::failed(descriptor.name, FailureKind::InvalidArguments, message);
        }

        debug!(operation = descriptor.name, "dispatching validated invocation");
        match descriptor.name {
            tools::FIND_PRODUCT => self.find_product(&arguments).await,
            tools::LIST_LOW_STOCK => self.list_low_stock(&arguments).await,
            tools::UPDATE_STOCK => self.update_stock(&arguments).await,
            // The registry is fixed; a resolved descriptor is always one of
            // the three routed above.
            other => Execution::failed(
                other,
                FailureKind::UnknownOperation,
                format!("`{other}` has no routing."),
            ),
        }
    }

    async fn find_product(&self, arguments: &Map<String, Value>) -> Execution {
        let name = required_str(arguments, "name");

        match self.store.find_by_name_substring(name).await {
            Ok(products) => Execution {
                operation: tools::FIND_PRODUCT.to_string(),
                outcome: OperationOutcome::Success(json!({
                    "query": name,
                    "count": products.len(),
                    "products": products_json(&products),
                })),
                mutated: false,
            },
            Err(error) => store_failure(tools::FIND_PRODUCT, error),
        }
    }

    async fn list_low_stock(&self, arguments: &Map<String, Value>) -> Execution {
        let threshold = required_i64(arguments, "threshold");

        match self.store.list_below_threshold(threshold).await {
            Ok(products) => Execution {
                operation: tools::LIST_LOW_STOCK.to_string(),
                outcome: OperationOutcome::Success(json!({
                    "threshold": threshold,
                    "count": products.len(),
                    "products": products_json(&products),
                })),
                mutated: false,
            },
            Err(error) => store_failure(tools::LIST_LOW_STOCK, error),
        }
    }

    async fn update_stock(&self, arguments: &Map<String, Value>) -> Execution {
        let product_id = required_i64(arguments, "product_id");
        let delta = required_i64(arguments, "delta");

        match self.store.adjust_stock(product_id, delta).await {
            Ok(product) => Execution {
                operation: tools::UPDATE_STOCK.to_string(),
                outcome: OperationOutcome::Success(json!({
                    "success": true,
                    "message": format!(
                        "Stock for `{}` (id {}) is now {}.",
                        product.name, product.id, product.stock
                    ),
                    "product": product_json(&product),
                })),
                mutated: true,
            },
            Err(error) => store_failure(tools::UPDATE_STOCK, error),
        }
    }
}

fn decode_arguments(raw: &str) -> Result<Map<String, Value>, String> {
    let decoded: Value = serde_json::from_str(raw)
        .map_err(|error| format!("arguments are not valid JSON: {error}"))?;

    match decoded {
        Value::Object(map) => Ok(map),
        other => Err(format!(
            "arguments must decode to a JSON object, got {}",
            json_kind(&other)
        )),
    }
}

fn validate_arguments(
    descriptor: &OperationDescriptor,
    arguments: &Map<String, Value>,
) -> Result<(), String> {
    for param in descriptor.parameters {
        match arguments.get(param.name) {
            None if param.required => {
                return Err(format!(
                    "required argument `{}` is missing for `{}`",
                    param.name, descriptor.name
                ));
            }
            None => {}
            Some(value) if !param.kind.matches(value) => {
                return Err(format!(
                    "argument `{}` must be a {}, got {}",
                    param.name,
                    param.kind.json_type_name(),
                    json_kind(value)
                ));
            }
            Some(_) => {}
        }
    }
    // Extra arguments are tolerated; only declared ones are read.
    Ok(())
}

fn store_failure(operation: &str, error: StoreError) -> Execution {
    // Store errors surface as human-readable text the model can relay,
    // never as raw internal codes.
    let (kind, message) = match error {
        StoreError::NotFound { id } => {
            (FailureKind::NotFound, format!("Product with id {id} does not exist."))
        }
        StoreError::InvalidAdjustment { current } => (
            FailureKind::InvalidAdjustment,
            format!("Cannot reduce stock below zero. Current stock is {current}."),
        ),
        StoreError::Database(error) => {
            warn!(operation, %error, "store access failed");
            (
                FailureKind::StoreUnavailable,
                "The inventory store is temporarily unavailable.".to_string(),
            )
        }
    };
    Execution::failed(operation, kind, message)
}

// Validation has already established presence and shape of required
// arguments; these fall back to neutral values rather than panicking.
fn required_str<'a>(arguments: &'a Map<String, Value>, name: &str) -> &'a str {
    arguments.get(name).and_then(Value::as_str).unwrap_or_default()
}

fn required_i64(arguments: &Map<String, Value>, name: &str) -> i64 {
    arguments.get(name).and_then(Value::as_i64).unwrap_or_default()
}

fn products_json(products: &[Product]) -> Value {
    Value::Array(products.iter().map(product_json).collect())
}

fn product_json(product: &Product) -> Value {
    json!({
        "id": product.id,
        "name": product.name,
        "price": product.price,
        "stock": product.stock,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use stocky_core::domain::product::Product;
    use stocky_db::InMemoryProductStore;

    use super::{Dispatcher, FailureKind, OperationOutcome};
    use crate::llm::InvocationRequest;

    fn dispatcher() -> Dispatcher<InMemoryProductStore> {
        Dispatcher::new(InMemoryProductStore::new(vec![
            Product { id: 1, name: "iPhone 15".into(), price: 25_990.0, stock: 5 },
            Product { id: 2, name: "MacBook Air M3".into(), price: 34_990.0, stock: 2 },
            Product { id: 3, name: "AirPods Pro".into(), price: 6_990.0, stock: 25 },
        ]))
    }

    fn request(operation: &str, raw_arguments: &str) -> InvocationRequest {
        InvocationRequest {
            call_id: "call-1".to_string(),
            operation: operation.to_string(),
            raw_arguments: raw_arguments.to_string(),
        }
    }

    fn failure_kind(outcome: &OperationOutcome) -> FailureKind {
        match outcome {
            OperationOutcome::Failure { kind, .. } => *kind,
            OperationOutcome::Success(payload) => {
                panic!("expected failure, got success payload {payload}")
            }
        }
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected_without_store_access() {
        let execution = dispatcher().execute(&request("drop_table", "{}")).await;

        assert_eq!(failure_kind(&execution.outcome), FailureKind::UnknownOperation);
        assert!(!execution.mutated);

        let payload = execution.outcome.payload();
        assert_eq!(payload["success"], json!(false));
        assert_eq!(payload["error"], json!("unknown_operation"));
    }

    #[tokio::test]
    async fn undecodable_arguments_short_circuit_as_malformed() {
        let execution = dispatcher().execute(&request("find_product", "not json {")).await;
        assert_eq!(failure_kind(&execution.outcome), FailureKind::MalformedArguments);
    }

    #[tokio::test]
    async fn non_object_arguments_are_malformed() {
        let execution = dispatcher().execute(&request("find_product", "[1, 2]")).await;
        assert_eq!(failure_kind(&execution.outcome), FailureKind::MalformedArguments);
    }

    #[tokio::test]
    async fn missing_required_argument_is_invalid() {
        let execution = dispatcher().execute(&request("update_stock", r#"{"delta": -2}"#)).await;

        assert_eq!(failure_kind(&execution.outcome), FailureKind::InvalidArguments);
        let payload = execution.outcome.payload();
        assert!(payload["message"].as_str().unwrap().contains("product_id"));
    }

    #[tokio::test]
    async fn wrong_typed_argument_is_invalid() {
        let execution =
            dispatcher().execute(&request("list_low_stock", r#"{"threshold": "three"}"#)).await;
        assert_eq!(failure_kind(&execution.outcome), FailureKind::InvalidArguments);
    }

    #[tokio::test]
    async fn fractional_integer_argument_is_invalid() {
        let execution =
            dispatcher().execute(&request("list_low_stock", r#"{"threshold": 2.5}"#)).await;
        assert_eq!(failure_kind(&execution.outcome), FailureKind::InvalidArguments);
    }

    #[tokio::test]
    async fn find_product_wraps_matches_with_query_and_count() {
        let execution =
            dispatcher().execute(&request("find_product", r#"{"name": "iPhone"}"#)).await;

        assert!(!execution.mutated);
        let payload = execution.outcome.payload();
        assert_eq!(payload["query"], json!("iPhone"));
        assert_eq!(payload["count"], json!(1));
        assert_eq!(payload["products"][0]["name"], json!("iPhone 15"));
    }

    #[tokio::test]
    async fn find_product_with_no_match_is_a_success_with_zero_count() {
        let execution =
            dispatcher().execute(&request("find_product", r#"{"name": "Nintendo"}"#)).await;

        assert!(!execution.outcome.is_failure());
        let payload = execution.outcome.payload();
        assert_eq!(payload["count"], json!(0));
        assert_eq!(payload["products"], json!([]));
    }

    #[tokio::test]
    async fn list_low_stock_wraps_threshold_and_sorted_products() {
        let execution =
            dispatcher().execute(&request("list_low_stock", r#"{"threshold": 6}"#)).await;

        let payload = execution.outcome.payload();
        assert_eq!(payload["threshold"], json!(6));
        assert_eq!(payload["count"], json!(2));
        assert_eq!(payload["products"][0]["name"], json!("MacBook Air M3"));
        assert_eq!(payload["products"][1]["name"], json!("iPhone 15"));
    }

    #[tokio::test]
    async fn update_stock_success_marks_mutation() {
        let dispatcher = dispatcher();
        let execution = dispatcher
            .execute(&request("update_stock", r#"{"product_id": 3, "delta": -5}"#))
            .await;

        assert!(execution.mutated);
        let payload = execution.outcome.payload();
        assert_eq!(payload["success"], json!(true));
        assert_eq!(payload["product"]["stock"], json!(20));
    }

    #[tokio::test]
    async fn update_stock_not_found_is_a_structured_failure() {
        let execution = dispatcher()
            .execute(&request("update_stock", r#"{"product_id": 9999, "delta": 1}"#))
            .await;

        assert_eq!(failure_kind(&execution.outcome), FailureKind::NotFound);
        assert!(!execution.mutated);
        let payload = execution.outcome.payload();
        assert_eq!(payload["message"], json!("Product with id 9999 does not exist."));
    }

    #[tokio::test]
    async fn update_stock_overdraw_reports_current_stock() {
        let execution = dispatcher()
            .execute(&request("update_stock", r#"{"product_id": 2, "delta": -10}"#))
            .await;

        assert_eq!(failure_kind(&execution.outcome), FailureKind::InvalidAdjustment);
        assert!(!execution.mutated);
        let payload = execution.outcome.payload();
        assert_eq!(
            payload["message"],
            json!("Cannot reduce stock below zero. Current stock is 2.")
        );
    }

    #[tokio::test]
    async fn extreme_delta_becomes_a_structured_failure() {
        let execution = dispatcher()
            .execute(&request(
                "update_stock",
                &format!(r#"{{"product_id": 1, "delta": {}}}"#, i64::MAX),
            ))
            .await;

        assert_eq!(failure_kind(&execution.outcome), FailureKind::InvalidAdjustment);
        assert!(!execution.mutated);
    }

    #[tokio::test]
    async fn extra_undeclared_arguments_are_tolerated() {
        let execution = dispatcher()
            .execute(&request("find_product", r#"{"name": "Mac", "verbose": true}"#))
            .await;
        assert!(!execution.outcome.is_failure());
    }
}
