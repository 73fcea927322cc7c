use stocky_core::config::{AppConfig, LoadOptions};
use stocky_db::{connect, migrations, SeedDataset, VerificationResult};

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
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

        let run_result = async {
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;

            let seed_result = SeedDataset::load(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

            let verification = SeedDataset::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 5u8))?;

            match verification_failure(&verification) {
                None => Ok(seed_result),
                Some(failure) => Err(failure),
            }
        }
        .await;

        pool.close().await;
        run_result
    });

    match result {
        Ok(seed_result) if seed_result.already_populated => CommandResult::success(
            "seed",
            "products table already populated; existing data left untouched",
        ),
        Ok(seed_result) => CommandResult::success(
            "seed",
            format!("seeded {} products into an empty inventory table", seed_result.inserted),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

// Verification failures share the migration/seed exit code: they mean the
// database is in a bad state, not that the model layer misbehaved.
fn verification_failure(
    verification: &VerificationResult,
) -> Option<(&'static str, String, u8)> {
    if verification.all_present {
        return None;
    }

    let failed_checks = verification
        .checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    let message = if failed_checks.is_empty() {
        "some seed rows failed to load".to_string()
    } else {
        format!("seed verification failed for products: {}", failed_checks.join(", "))
    };
    Some(("seed_verification", message, 5u8))
}
