use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use storefront_api::{audit, clock, config::AppConfig, db, events, app_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(environment = %config.environment, "Starting storefront-api");

    let pool = db::establish_connection_from_app_config(&config)
        .await
        .context("failed to connect to database")?;

    let (event_sender, _event_task) = events::channel(1024);
    let (audit_sink, _audit_task) = audit::channel(1024);

    let state = AppState::new(
        Arc::new(pool),
        config.clone(),
        event_sender,
        audit_sink,
        clock::system_clock(),
    );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(%addr, "Listening");
    axum::serve(listener, app_router(state)).await?;

    Ok(())
}
