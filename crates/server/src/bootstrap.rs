use claimly_core::config::{AppConfig, ConfigError, LoadOptions};
use claimly_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Bootstrap against an already-loaded config, so `main` can initialize
/// logging from the same instance first.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(Application { config, db_pool })
}

#[cfg(test)]
mod tests {
    use claimly_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn memory_options() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_connects_and_applies_the_schema() {
        let app = bootstrap(memory_options())
            .await
            .expect("bootstrap should succeed against an in-memory database");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('company', 'user_account', 'approval_rule', 'expense')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema tables should be queryable after bootstrap");
        assert_eq!(table_count, 4, "bootstrap should expose the baseline workflow tables");

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_surfaces_invalid_configuration() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://elsewhere/claimly".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("non-sqlite url must be rejected").to_string();
        assert!(message.contains("database.url"));
    }
}
