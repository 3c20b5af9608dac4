use anyhow::{anyhow, Context};
use dotenvy::dotenv;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;

use evidence_portal::api_router::build_router;
use evidence_portal::core::config::AppConfig;
use evidence_portal::core::shared::state::AppState;
use evidence_portal::core::shared::utils::{create_pool, create_s3_client, run_migrations};
use evidence_portal::portal::objects::S3ObjectStore;
use evidence_portal::portal::storage::PgPortalStore;
use evidence_portal::portal::{PortalService, PortalSettings};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().map_err(|e| anyhow!(e))?;

    let pool = create_pool(&config.database).context("Failed to create database pool")?;
    let migration_pool = pool.clone();
    tokio::task::spawn_blocking(move || run_migrations(&migration_pool))
        .await
        .context("Migration task panicked")?
        .map_err(|e| anyhow!("{}", e))?;

    let s3 = create_s3_client(&config.drive).await;
    info!(
        "Evidence bucket {} at {}",
        config.drive.bucket, config.drive.endpoint
    );

    let portal = PortalService::new(
        Arc::new(PgPortalStore::new(pool)),
        Arc::new(S3ObjectStore::new(s3, config.drive.bucket.clone())),
        PortalSettings::from_config(&config),
    );
    portal
        .seed_catalog()
        .await
        .context("Failed to seed control catalog")?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server host/port")?;
    let app = build_router(Arc::new(AppState::new(config, portal)));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}
