use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("User directory error: {0}")]
    Directory(String),
    #[error("Push transport error: {0}")]
    Transport(String),
    #[error("Probe failed: {0}")]
    ProbeFailed(String),
    #[error("No signal available: {0}")]
    Unavailable(String),
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Service is shutting down")]
    ShuttingDown,
}

impl From<anyhow::Error> for MonitoringError {
    fn from(err: anyhow::Error) -> Self {
        MonitoringError::Storage(err.to_string())
    }
}

impl IntoResponse for MonitoringError {
    fn into_response(self) -> Response {
        let status = match &self {
            MonitoringError::Storage(_) | MonitoringError::ProbeFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            MonitoringError::Directory(_) => StatusCode::BAD_GATEWAY,
            MonitoringError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            MonitoringError::Transport(_)
            | MonitoringError::Unavailable(_)
            | MonitoringError::ShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            MonitoringError::Forbidden(_) => StatusCode::FORBIDDEN,
            MonitoringError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        (status, Json(serde_json::json!({
            "error": self.to_string(),
            "timestamp": chrono::Utc::now()
        }))).into_response()
    }
}
