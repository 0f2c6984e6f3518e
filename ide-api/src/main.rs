use anyhow::{Context, Result};
use ide_api::{create_app, start_subscription_sweeper, AppState, Config};
use ide_logging::{init_subscriber, LogConfig};
use ide_orchestrator::db::{backup_database, create_pool, run_migrations};
use ide_orchestrator::GrpcClusterController;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_subscriber(&LogConfig::from_env())?;

    info!("Starting ide-api service...");

    let config = Config::from_env();
    info!(
        "Configuration loaded: bind_addr={}, db_path={}, cluster_addr={}",
        config.bind_addr,
        config.db_path.display(),
        config.cluster_addr
    );

    // Backup before migrations
    let db_path = &config.db_path;
    if let Some(backup_path) = backup_database(db_path)? {
        info!("Database backed up to: {}", backup_path.display());
    }

    let pool = create_pool(db_path).await?;
    info!("Running database migrations...");
    run_migrations(&pool).await?;
    info!("Migrations complete");

    let cluster = GrpcClusterController::connect_lazy(
        &config.cluster_addr,
        Duration::from_secs(config.cluster_connect_timeout_secs),
    )
    .context("Invalid cluster controller address")?;

    let state = AppState::new(pool, Arc::new(cluster), &config);

    tokio::spawn(start_subscription_sweeper(
        state.subscriptions.clone(),
        config.subscription_sweep_interval_secs,
    ));
    info!(
        "Subscription sweeper started (interval: {}s)",
        config.subscription_sweep_interval_secs
    );

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
