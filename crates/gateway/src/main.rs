//! Gateway entry point.
//!
//! Wires the Redis cache, the Postgres durable store, the session manager,
//! and the application services, then serves the HTTP and WebSocket surface.

use anyhow::Result;
use gateway::{create_router, AppState, Config, ConnectionRegistry, Dispatcher, Services};
use metrics_exporter_prometheus::PrometheusBuilder;
use session::SessionManager;
use std::sync::Arc;
use storage::{LockConfig, PostgresDatabase, RedisStore};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting gateway...");

    let config = Config::from_env();

    // Initialize Prometheus metrics
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()?;
    info!(
        "Prometheus metrics available at http://0.0.0.0:{}/metrics",
        config.metrics_port
    );

    // Stores
    info!("Connecting to Redis at {}...", config.redis_url);
    let store = Arc::new(RedisStore::new(&config.redis_url)?);

    info!("Connecting to Postgres...");
    let db = Arc::new(PostgresDatabase::connect(&config.database_url).await?);
    info!("Connected to Postgres");

    // Services
    let sessions = SessionManager::new(store.clone(), &config.jwt_secret, config.session_ttl);
    let services = Arc::new(Services::new(
        store,
        db,
        sessions.clone(),
        LockConfig::default(),
        config.starting_balance,
    ));
    let dispatcher = Dispatcher::new(services.clone(), config.request_timeout);

    let state = Arc::new(AppState {
        registry: Arc::new(ConnectionRegistry::new()),
        services,
        sessions,
        dispatcher,
        config: config.clone(),
    });
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Gateway listening on http://{}", config.bind_addr);
    info!("Available endpoints:");
    info!("  POST /client  - Register");
    info!("  POST /login   - Issue a session token");
    info!("  POST /logout  - Revoke the session");
    info!("  GET  /wallet  - Authoritative balance");
    info!("  GET  /ws      - WebSocket upgrade");
    info!("  GET  /health  - Health check");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal");
}
