//! Mediashelf Server - media catalog import and cover enrichment
//!
//! A Rust REST API server for importing and enriching media catalogs.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediashelf_server::{
    config::AppConfig,
    create_router,
    repository::{EntityStore, InMemoryEntityStore},
    services::Services,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("mediashelf_server={},tower_http=debug", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Mediashelf Server v{}", env!("CARGO_PKG_VERSION"));

    // Entity store
    let store: Arc<dyn EntityStore> = match &config.storage.snapshot_path {
        Some(path) => Arc::new(
            InMemoryEntityStore::with_snapshot(path)
                .await
                .context("Failed to open catalog snapshot")?,
        ),
        None => {
            tracing::warn!("No snapshot path configured, catalog is kept in memory only");
            Arc::new(InMemoryEntityStore::new())
        }
    };

    // Save server address before moving config
    let server_host = config.server.host.clone();
    let server_port = config.server.port;
    let interval_secs = config.enrichment.interval_secs;

    let services = Services::new(store, &config).context("Failed to create services")?;
    let shutdown = CancellationToken::new();

    let scheduler = if interval_secs > 0 {
        Some(
            services
                .scheduler
                .spawn_periodic(Duration::from_secs(interval_secs), shutdown.clone()),
        )
    } else {
        tracing::info!("Periodic cover enrichment disabled");
        None
    };

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
        shutdown: shutdown.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(server_host.parse().context("Invalid host address")?, server_port);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    if let Some(handle) = scheduler {
        handle.await.ok();
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM, cancelling background work
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received terminate signal, shutting down"),
    }

    shutdown.cancel();
}
