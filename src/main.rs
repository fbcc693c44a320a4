use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use linktrail::config::{Config, DatabaseBackend};
use linktrail::service::{LinkService, ServiceSettings};
use linktrail::storage::{CachedStorage, MemoryStorage, SqliteStorage, Storage};
use linktrail::{api, redirect};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let backend: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(
                SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
        DatabaseBackend::Memory => {
            info!("Using in-memory storage, links will not survive a restart");
            Arc::new(MemoryStorage::new())
        }
    };

    info!("Initializing database...");
    backend.init().await?;
    info!("Database initialized successfully");

    let storage: Arc<dyn Storage> = Arc::new(CachedStorage::new(
        backend,
        config.cache.max_weight,
        config.cache.ttl_secs,
    ));

    let settings = ServiceSettings {
        base_url: config.base_url.clone(),
        day_offset: config.analytics.day_offset()?,
    };
    let service = Arc::new(LinkService::new(storage, settings));

    // Create routers
    let api_router = api::create_api_router(Arc::clone(&service));
    let redirect_router =
        redirect::create_redirect_router(Arc::clone(&service), config.analytics.clone());

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("API server listening on http://{}", api_addr);

    let redirect_addr = format!(
        "{}:{}",
        config.redirect_server.host, config.redirect_server.port
    );
    let redirect_listener = tokio::net::TcpListener::bind(&redirect_addr).await?;
    info!("Redirect server listening on http://{}", redirect_addr);
    info!("Short links resolve under {}", config.base_url);

    // Run both servers concurrently
    tokio::try_join!(
        axum::serve(api_listener, api_router).with_graceful_shutdown(shutdown_signal()),
        axum::serve(
            redirect_listener,
            redirect_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal()),
    )?;

    info!("Servers stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
