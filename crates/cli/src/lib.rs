pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stocky_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "stocky",
    about = "Stocky inventory assistant CLI",
    long_about = "Ask a model-backed inventory assistant about the product catalog, and operate its database: migrations, seed fixtures, config inspection, readiness checks.",
    after_help = "Examples:\n  stocky ask \"Which products have fewer than 3 units?\"\n  stocky migrate\n  stocky doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Ask the inventory assistant one question and print its answer")]
    Ask {
        #[arg(help = "The question; read from stdin when omitted")]
        question: Option<String>,
        #[arg(long, help = "Answer language override, e.g. 'Czech'")]
        language: Option<String>,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the sample product catalog if the inventory table is empty")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, API key readiness, and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { question, language } => commands::ask::run(question, language),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays reserved for command output. The level
/// and format come from configuration when it loads; a broken config must
/// not prevent the command (and its diagnostics) from running.
fn init_logging() {
    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);

    let level = logging.level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr);

    let init_result = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    // A second init in the same process (tests) is fine to ignore.
    let _ = init_result;
}
