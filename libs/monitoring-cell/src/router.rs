// =====================================================================================
// MONITORING CELL ROUTER
// =====================================================================================

use std::sync::Arc;

use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;

use crate::handlers::{
    get_connection_stats, get_system_status, notification_stream, run_health_checks,
    send_notification,
};
use crate::services::MonitoringCoordinator;

#[derive(Clone)]
pub struct MonitoringState {
    pub config: Arc<AppConfig>,
    pub coordinator: Arc<MonitoringCoordinator>,
}

impl FromRef<MonitoringState> for Arc<AppConfig> {
    fn from_ref(state: &MonitoringState) -> Self {
        state.config.clone()
    }
}

pub fn create_monitoring_router(
    config: Arc<AppConfig>,
    coordinator: Arc<MonitoringCoordinator>,
) -> Router {
    let state = MonitoringState { config, coordinator };

    // Any authenticated user
    let stream_routes = Router::new().route("/notifications/stream", get(notification_stream));

    // Admin only; checked in each handler
    let admin_routes = Router::new()
        .route("/monitoring/status", get(get_system_status))
        .route("/monitoring/connections", get(get_connection_stats))
        .route("/monitoring/health/run", post(run_health_checks))
        .route("/notifications/send", post(send_notification));

    Router::new()
        .merge(stream_routes)
        .merge(admin_routes)
        .with_state(state)
}
