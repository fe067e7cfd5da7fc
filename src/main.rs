//! retro-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use retro_gateway::app_state::AppState;
use retro_gateway::config::GatewayConfig;
use retro_gateway::domain::Hub;
use retro_gateway::server::build_app;
use retro_gateway::service::ArenaService;
use retro_gateway::store::{ArenaStore, MemoryStore, PostgresStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env().context("invalid LISTEN_ADDR")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, "starting retro-gateway");

    // Build store
    let store: Arc<dyn ArenaStore> = if config.persistence_enabled {
        let store = PostgresStore::connect(&config.database)
            .await
            .context("failed to connect to PostgreSQL")?;
        tracing::info!("using PostgreSQL store");
        Arc::new(store)
    } else {
        tracing::warn!("persistence disabled, using in-memory store");
        Arc::new(MemoryStore::new())
    };

    // Build domain and service layers
    let hub = Hub::start(config.hub_command_capacity);
    let arena_service = Arc::new(ArenaService::new(store, hub));

    // Build application state and router
    let listen_addr = config.listen_addr;
    let app = build_app(AppState::new(arena_service, config));

    // Start server
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    tracing::info!(addr = %listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
