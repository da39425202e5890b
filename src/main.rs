//! Planboard sync daemon
//!
//! Keeps the local task database of this device in step with the central
//! sync service for the configured user.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use planboard_sync::config::Config;
use planboard_sync::session::ActiveUser;
use planboard_sync::store::SqliteTaskStore;
use planboard_sync::sync::{
    monitor_reachability, Connectivity, EngineConfig, EngineFactory, HttpRemote,
    SqliteCheckpointStore, SyncSupervisor,
};
use planboard_sync::{client_id, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "planboard_sync=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("Starting Planboard sync v{}", env!("CARGO_PKG_VERSION"));

    let pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);

    let client_id = client_id::get_or_create(&pool)
        .await
        .context("Failed to load client id")?;
    tracing::info!("Client id: {}", client_id);

    if !config.remote.enabled() {
        tracing::warn!("SYNC_API_BASE is not set, sync disabled");
        return Ok(());
    }
    tracing::info!("Sync endpoint: {}", config.remote.base_url);

    let user = ActiveUser::new();
    match &config.session.user_id {
        Some(user_id) => user.set(user_id),
        None => tracing::warn!("SYNC_USER_ID not set, waiting for a user"),
    }

    let remote = HttpRemote::new(&config.remote.base_url, config.remote.timeout())
        .context("Failed to build HTTP client")?;

    let mut engine_config = EngineConfig::new(&client_id);
    engine_config.pull_limit = config.sync.pull_limit;

    // Offline until the first reachability check succeeds
    let connectivity = Connectivity::new(false);

    let factory = EngineFactory {
        config: engine_config,
        store: Arc::new(SqliteTaskStore::new(pool.clone())),
        remote: Arc::new(remote),
        checkpoints: Arc::new(SqliteCheckpointStore::new(pool.clone())),
        user,
        connectivity: connectivity.clone(),
    };
    let supervisor = SyncSupervisor::new(factory, config.sync.interval());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let monitor = {
        let base_url = config.remote.base_url.clone();
        let period = config.sync.interval();
        let stop = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = monitor_reachability(connectivity, &base_url, period, stop).await {
                tracing::error!("Reachability monitor stopped: {}", e);
            }
        })
    };

    supervisor.run(shutdown_rx).await;
    let _ = monitor.await;
    pool.close().await;

    tracing::info!("Sync shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
