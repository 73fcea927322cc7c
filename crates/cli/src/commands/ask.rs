use std::io::{BufRead, Write};

use stocky_agent::{AgentError, Dispatcher, OpenAiClient, Orchestrator};
use stocky_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use stocky_db::{connect, migrations, SeedDataset, SqlProductStore};

use crate::commands::CommandResult;

/// One full user turn: bootstrap the store, hand the question to the
/// orchestrator, print the model-composed answer on stdout.
pub fn run(question: Option<String>, language: Option<String>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        overrides: ConfigOverrides { language, ..ConfigOverrides::default() },
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    if let Err(error) = config.llm.require_api_key() {
        return CommandResult::failure("ask", "config_validation", error.to_string(), 2);
    }

    let question = match question.filter(|text| !text.trim().is_empty()) {
        Some(question) => question,
        None => match read_question_from_stdin() {
            Ok(question) => question,
            Err(error) => {
                return CommandResult::failure(
                    "ask",
                    "input",
                    format!("could not read the question: {error}"),
                    2,
                );
            }
        },
    };
    if question.trim().is_empty() {
        return CommandResult::failure("ask", "input", "the question is empty", 2);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        // Bootstrap is idempotent: schema creation and the write-once seed
        // make a fresh database usable on first ask.
        let turn_result = async {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;
            SeedDataset::load(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

            let client = OpenAiClient::from_config(&config.llm)
                .map_err(|error| ("model_client", error.to_string(), 6u8))?;
            let store = SqlProductStore::new(pool.clone());
            let orchestrator =
                Orchestrator::new(client, Dispatcher::new(store), config.agent.language.clone());

            orchestrator.run_turn(question.trim()).await.map_err(|error| match error {
                AgentError::ModelUnavailable(_) => {
                    ("model_unavailable", error.to_string(), 6u8)
                }
                AgentError::AnswerUnavailable { mutated: true, .. } => (
                    "answer_generation",
                    format!("the stock change was applied, but {error}"),
                    7u8,
                ),
                AgentError::AnswerUnavailable { .. } => {
                    ("answer_generation", error.to_string(), 7u8)
                }
            })
        }
        .await;

        // The pool is scoped to this turn; release it on every exit path.
        pool.close().await;
        turn_result
    });

    match result {
        Ok(reply) => {
            if let Some(operation) = &reply.invoked {
                tracing::info!(operation, "answer informed by one operation");
            }
            CommandResult { exit_code: 0, output: reply.text }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ask", error_class, message, exit_code)
        }
    }
}

fn read_question_from_stdin() -> Result<String, std::io::Error> {
    let mut stderr = std::io::stderr();
    write!(stderr, "question: ")?;
    stderr.flush()?;

    let mut question = String::new();
    std::io::stdin().lock().read_line(&mut question)?;
    Ok(question.trim_end().to_string())
}
