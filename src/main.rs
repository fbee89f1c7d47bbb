use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tally::api;
use tally::config::{Config, DatabaseBackend, TrustedProxyMode};
use tally::counter::CounterService;
use tally::cursor::CursorSigner;
use tally::identity::IdentityHasher;
use tally::storage::{PostgresStorage, SqliteStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tally=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Without a key the counters would run unkeyed, so refuse to start
    let identities = Arc::new(
        IdentityHasher::new(&config.identity.ip_hash_secret)
            .context("cannot derive visitor identities")?,
    );
    let cursors = Arc::new(CursorSigner::new(
        config.pagination.cursor_hmac_secret.as_deref(),
    ));

    // Initialize storage
    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(
                SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage");
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections)
                    .await?,
            )
        }
    };

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    let counter = Arc::new(CounterService::new(
        storage,
        identities,
        cursors,
        config.counters.max_likes_per_visitor,
    ));
    info!(
        max_likes_per_visitor = counter.max_likes_per_visitor(),
        "Counter service ready"
    );

    match config.client_ip.trusted_proxy_mode {
        TrustedProxyMode::None => info!("Client addresses taken from socket peer"),
        TrustedProxyMode::Cloudflare => info!("Client addresses taken from CF-Connecting-IP"),
        TrustedProxyMode::Standard => info!(
            trusted_proxies = config.client_ip.trusted_proxies.len(),
            num_trusted_proxies = ?config.client_ip.num_trusted_proxies,
            "Client addresses taken from Forwarded / X-Forwarded-For"
        ),
    }

    let router = api::create_api_router(counter, config.client_ip.clone(), &config.cors);

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("🚀 API server listening on http://{}", api_addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
