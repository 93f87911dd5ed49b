//! podsync control-plane server.
//!
//! Starts the HTTP API, recovers sessions orphaned by an unclean shutdown,
//! and runs the auto-sync scheduling loop.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use podsync_client::TubeClient;
use podsync_core::{CredentialPool, CredentialStore, SyncConfig, load_credentials_config};
use podsync_db::CredentialRepository;

use podsync_server::{AppState, ServerConfig, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    podsync_db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("Database ready");

    // Credential pool: keys from credentials.toml, usage carried over from
    // the persisted mirror.
    let credentials_config = load_credentials_config(config.credentials_config.as_deref())
        .context("Failed to load credentials configuration")?;
    let credential_repo = CredentialRepository::new(pool.clone());
    credential_repo
        .mirror_entries(&credentials_config.credentials)
        .await
        .context("Failed to mirror credential entries")?;
    let usage = credential_repo.load_usage().await.unwrap_or_default();

    let usage_tx = CredentialPool::spawn_usage_writer(credential_repo.clone());
    let credential_pool = CredentialPool::new(&credentials_config.credentials, &usage)
        .with_usage_sink(usage_tx);
    info!(
        credentials = credentials_config.credentials.len(),
        usable = credential_pool.usable_count(),
        "Credential pool initialized"
    );

    let client =
        TubeClient::new(credential_pool.clone()).context("Failed to initialize API client")?;

    let shutdown_token = CancellationToken::new();
    let app_state = AppState::new(
        pool,
        client,
        credential_pool,
        config.admin_token.clone(),
        shutdown_token.clone(),
    );

    // Fence off sessions left running by an unclean shutdown before
    // accepting any start request.
    let stale_after = SyncConfig::default().stale_heartbeat_after;
    app_state
        .controller
        .recover(stale_after)
        .await
        .context("Failed to recover stale sessions")?;

    tokio::spawn(podsync_server::autosync::run_auto_sync_loop(
        app_state.clone(),
        shutdown_token.clone(),
    ));

    let controller = app_state.controller.clone();
    let app = create_router(app_state, &config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid address")?;
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("Starting podsync control plane on http://{}", addr);
    info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token, controller))
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal(
    shutdown_token: CancellationToken,
    controller: podsync_server::state::Controller,
) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
    shutdown_token.cancel();

    // Stop any active job cleanly so the session freezes as `stopped`
    // instead of being fenced as stale on the next boot.
    if controller.stop().is_ok() {
        info!("Requested cooperative stop of the active sync job");
    }

    // Give the scheduler a moment to finish its current chunk.
    tokio::time::sleep(Duration::from_secs(2)).await;
}
