mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use velosync_client::{CatalogClient, ClientConfig};
use velosync_resilience::{BreakerConfig, CircuitBreaker, ConnectivityMonitor, MonitorConfig};
use velosync_sync::{MemoryCache, SyncOrchestrator, SyncPolicy};

use crate::{
    api::{build_app, AppState},
    middleware::{ApiAuth, ApiRateLimit},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(velosync_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::from_app_config(&config)));
    let monitor = Arc::new(ConnectivityMonitor::new(MonitorConfig::from_app_config(
        &config,
    )));
    let client = CatalogClient::new(
        ClientConfig::from_app_config(&config),
        Arc::clone(&breaker),
        Arc::clone(&monitor),
    )?;
    let cache = Arc::new(MemoryCache::new());
    let orchestrator = Arc::new(SyncOrchestrator::new(
        client,
        cache,
        Arc::clone(&breaker),
        Arc::clone(&monitor),
        SyncPolicy::from_app_config(&config),
    ));

    let _scheduler =
        scheduler::build_scheduler(&config.sync_cron, Arc::clone(&orchestrator)).await?;

    let auth = ApiAuth::from_env(matches!(
        config.env,
        velosync_core::Environment::Development
    ))?;
    let app = build_app(
        AppState {
            orchestrator,
            breaker,
            monitor,
        },
        auth,
        ApiRateLimit::from_app_config(&config),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "velosync server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
