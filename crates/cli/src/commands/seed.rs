use crate::commands::CommandResult;
use claimly_core::config::{AppConfig, LoadOptions};
use claimly_db::{connect_with_settings, migrations, DemoSeedDataset};

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
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<String, (&'static str, String, u8)> = if !verification.passed {
            Err(("seed_verification", verification_failure_message(
                &verification
                    .checks
                    .iter()
                    .filter_map(|check| (!check.passed).then_some(check.name))
                    .collect::<Vec<_>>(),
            ), 6u8))
        } else {
            Ok(format!(
                "demo dataset loaded: company `{}` with users {}",
                seeded.company_id,
                seeded.user_ids.join(", ")
            ))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(message) => CommandResult::success("seed", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_failure_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let message =
            verification_failure_message(&["company row present", "one user per role"]);
        assert_eq!(
            message,
            "seed verification failed for checks: company row present, one user per role"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_failure_message(&[]), "some seed data failed to load");
    }
}
