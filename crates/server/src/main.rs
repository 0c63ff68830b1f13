mod bootstrap;
mod health;
pub mod routes;
pub mod service;

use anyhow::Result;
use claimly_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use claimly_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    // Bootstrap using the same config we already loaded
    let app = bootstrap::bootstrap_with_config(config).await?;

    let rates = app.config.currency.rate_table();
    let router = routes::router(app.db_pool.clone(), rates)
        .merge(health::router(app.db_pool.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "claimly-server listening"
    );

    let grace_secs = app.config.server.graceful_shutdown_secs;
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown(grace_secs)).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "claimly-server stopping"
    );
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown(grace_secs: u64) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!(
        event_name = "system.server.draining",
        correlation_id = "shutdown",
        grace_secs,
        "shutdown signal received; draining in-flight requests"
    );
    // Hard stop if draining exceeds the configured grace period.
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(grace_secs)).await;
        tracing::error!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            "graceful shutdown exceeded its grace period; exiting"
        );
        std::process::exit(1);
    });
}
