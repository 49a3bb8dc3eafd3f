use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use monitoring_cell::services::MonitoringCoordinator;
use monitoring_cell::store::{MonitoringStore, SweepSource, UserDirectory};
use monitoring_cell::{InMemoryStore, SupabaseMonitoringStore};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

type Collaborators = (
    Arc<dyn MonitoringStore>,
    Arc<dyn UserDirectory>,
    Arc<dyn SweepSource>,
);

fn collaborators(config: &AppConfig) -> Collaborators {
    if config.is_configured() {
        info!("Using Supabase store at {}", config.supabase_url);
        let store = Arc::new(SupabaseMonitoringStore::new(SupabaseClient::new(config)));
        return (store.clone(), store.clone(), store);
    }

    let store = Arc::new(InMemoryStore::new());
    (store.clone(), store.clone(), store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting monitoring API server");

    let config = Arc::new(AppConfig::from_env());

    let (store, directory, sweep_source) = collaborators(&config);
    let coordinator =
        MonitoringCoordinator::start_with_defaults(&config.monitoring, store, directory, sweep_source);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(config.clone(), coordinator.clone())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(coordinator))
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM after the monitoring engine has shut down, so
/// open event streams end and the server can drain.
async fn shutdown_signal(coordinator: Arc<MonitoringCoordinator>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    coordinator.shutdown().await;
}
