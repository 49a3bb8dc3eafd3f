use std::sync::Arc;

use axum::{routing::get, Router};

use monitoring_cell::create_monitoring_router;
use monitoring_cell::services::MonitoringCoordinator;
use shared_config::AppConfig;

pub fn create_router(config: Arc<AppConfig>, coordinator: Arc<MonitoringCoordinator>) -> Router {
    Router::new()
        .route("/", get(|| async { "Monitoring API is running!" }))
        .merge(create_monitoring_router(config, coordinator))
}
