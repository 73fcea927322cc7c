use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use stocky_core::config::{AppConfig, LoadOptions, LogFormat};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let mut push = |key: &str, value: String, env_vars: &[&str]| {
        lines.push(render_line(
            key,
            &value,
            field_source(key, env_vars, config_file_doc.as_ref(), config_file_path.as_deref()),
        ));
    };

    push("database.url", config.database.url.clone(), &["STOCKY_DATABASE_URL"]);
    push(
        "database.max_connections",
        config.database.max_connections.to_string(),
        &["STOCKY_DATABASE_MAX_CONNECTIONS"],
    );
    push(
        "database.timeout_secs",
        config.database.timeout_secs.to_string(),
        &["STOCKY_DATABASE_TIMEOUT_SECS"],
    );

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|secret| redact_secret(secret.expose_secret()))
        .unwrap_or_else(|| "(not set)".to_string());
    push("llm.api_key", api_key, &["STOCKY_LLM_API_KEY", "OPENAI_API_KEY"]);
    push("llm.base_url", config.llm.base_url.clone(), &["STOCKY_LLM_BASE_URL"]);
    push("llm.model", config.llm.model.clone(), &["STOCKY_LLM_MODEL"]);
    push("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["STOCKY_LLM_TIMEOUT_SECS"]);

    push("agent.language", config.agent.language.clone(), &["STOCKY_AGENT_LANGUAGE"]);

    push(
        "logging.level",
        config.logging.level.clone(),
        &["STOCKY_LOGGING_LEVEL", "STOCKY_LOG_LEVEL"],
    );
    let format = match config.logging.format {
        LogFormat::Compact => "compact",
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    };
    push(
        "logging.format",
        format.to_string(),
        &["STOCKY_LOGGING_FORMAT", "STOCKY_LOG_FORMAT"],
    );

    lines.join("\n")
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} ({source})")
}

fn field_source(
    key: &str,
    env_vars: &[&str],
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    for env_var in env_vars {
        if env::var(env_var).map(|value| !value.trim().is_empty()).unwrap_or(false) {
            return format!("env: {env_var}");
        }
    }

    if let (Some(doc), Some(path)) = (file_doc, file_path) {
        if file_doc_has_key(doc, key) {
            return format!("file: {}", path.display());
        }
    }

    "default".to_string()
}

fn file_doc_has_key(doc: &Value, dotted_key: &str) -> bool {
    let mut current = doc;
    for part in dotted_key.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("stocky.toml"), PathBuf::from("config/stocky.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    toml::from_str(&raw).ok()
}

fn redact_secret(value: &str) -> String {
    // Show just enough to recognize which key is configured.
    let visible: String = value.chars().take(6).collect();
    if value.len() <= 6 {
        "******".to_string()
    } else {
        format!("{visible}...")
    }
}

#[cfg(test)]
mod tests {
    use super::{file_doc_has_key, redact_secret};

    #[test]
    fn redaction_never_echoes_a_full_key() {
        assert_eq!(redact_secret("sk-test-1234567890"), "sk-tes...");
        assert_eq!(redact_secret("short"), "******");
    }

    #[test]
    fn dotted_key_lookup_walks_tables() {
        let doc: toml::Value =
            toml::from_str("[llm]\nmodel = \"gpt-4o\"\n").expect("parse");
        assert!(file_doc_has_key(&doc, "llm.model"));
        assert!(!file_doc_has_key(&doc, "llm.api_key"));
        assert!(!file_doc_has_key(&doc, "database.url"));
    }
}
