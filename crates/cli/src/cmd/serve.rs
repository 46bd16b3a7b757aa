//! Run the intake server, the debounce engine and the stuck-lock reporter

use crate::server::{create_router, AppState};
use anyhow::{Context, Result};
use settle_core::{KeyStateStore, SettleConfig, SystemClock};
use settle_engine::{Coordinator, StuckLockReporter};
use settle_store::SledStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub async fn run(config: SettleConfig) -> Result<()> {
    // Fail fast before touching the store
    let engine_config = config
        .engine_config()
        .context("Downstream settings are incomplete")?;
    let addr = config.listen_addr()?;

    let store: Arc<dyn KeyStateStore> = Arc::new(
        SledStore::open(&config.store.path)
            .with_context(|| format!("Failed to open store at {}", config.store.path.display()))?,
    );

    let coordinator = Arc::new(Coordinator::new(&engine_config, Arc::clone(&store))?);

    // Evaluations detach; each logs its own outcome
    coordinator
        .resume_pending()
        .await
        .context("Failed to scan store for pending batches")?;

    if config.reconcile.enabled {
        let reporter = StuckLockReporter::new(
            Arc::clone(&store),
            Arc::new(SystemClock),
            Duration::from_secs(config.reconcile.interval_secs),
            Duration::from_secs(config.reconcile.stale_after_secs),
        );
        tokio::spawn(reporter.run());
    }

    let app = create_router(AppState::new(Arc::clone(&coordinator), &config));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("settle listening on {}", addr);
    info!(store = %config.store.path.display(), "Store opened");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("settle shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
