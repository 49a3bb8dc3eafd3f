// =====================================================================================
// MONITORING CELL HANDLERS
// =====================================================================================

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use shared_models::auth::User;
use shared_utils::auth::AuthenticatedUser;

use crate::error::MonitoringError;
use crate::models::{
    ConnectionStats, HealthCheckResult, RecipientType, SendNotificationRequest, SystemStatus,
};
use crate::router::MonitoringState;
use crate::services::ChannelTransport;

fn require_admin(user: &User) -> Result<(), MonitoringError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(MonitoringError::Forbidden("admin role required".to_string()))
    }
}

// =====================================================================================
// PUSH STREAM
// =====================================================================================

/// Opens the caller's server-sent event stream. The first event is `connected`,
/// followed by `recent_notifications` when the caller has unread items.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn notification_stream(
    State(state): State<MonitoringState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, MonitoringError> {
    let (transport, receiver) = ChannelTransport::channel(state.config.monitoring.channel_capacity);
    let connection_id = Uuid::new_v4().to_string();

    state
        .coordinator
        .hub()
        .add_connection(connection_id, user.id.clone(), transport)
        .await?;

    let stream = receiver
        .into_stream()
        .map(|event| Ok(Event::default().event(event.name()).data(event.data().to_string())));

    // Proxy keep-alive only; liveness is tracked by hub heartbeats.
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// =====================================================================================
// ADMINISTRATIVE ENDPOINTS
// =====================================================================================

#[instrument(skip(state, user))]
pub async fn get_system_status(
    State(state): State<MonitoringState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<SystemStatus>, MonitoringError> {
    require_admin(&user)?;
    Ok(Json(state.coordinator.get_system_status().await))
}

#[instrument(skip(state, user))]
pub async fn get_connection_stats(
    State(state): State<MonitoringState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<ConnectionStats>, MonitoringError> {
    require_admin(&user)?;
    Ok(Json(state.coordinator.hub().get_stats().await))
}

#[instrument(skip(state, user))]
pub async fn run_health_checks(
    State(state): State<MonitoringState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<HealthCheckResult>>, MonitoringError> {
    require_admin(&user)?;
    if !state.coordinator.is_active() {
        return Err(MonitoringError::ShuttingDown);
    }

    info!(admin_id = %user.id, "Health cycle requested");
    Ok(Json(state.coordinator.engine().run_cycle().await))
}

#[instrument(skip(state, user, request))]
pub async fn send_notification(
    State(state): State<MonitoringState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(request): Json<SendNotificationRequest>,
) -> Result<Json<Value>, MonitoringError> {
    require_admin(&user)?;

    let hub = state.coordinator.hub();
    let deliveries = match request.recipient_type {
        RecipientType::User => {
            let user_id = request
                .recipient_id
                .as_deref()
                .ok_or_else(|| MonitoringError::BadRequest("recipient_id is required".to_string()))?;
            vec![hub.send_to_user(user_id, &request.notification).await]
        }
        RecipientType::Role => {
            let role = request
                .recipient_id
                .as_deref()
                .ok_or_else(|| MonitoringError::BadRequest("recipient_id is required".to_string()))?;
            hub.send_to_role(role, &request.notification).await?
        }
        RecipientType::All => hub.send_to_all(&request.notification).await?,
        RecipientType::Group => {
            return Err(MonitoringError::BadRequest(
                "group recipients are not supported".to_string(),
            ))
        }
    };

    let recipients = deliveries.len();
    let persisted = deliveries.iter().filter(|d| d.persisted).count();
    let delivered = deliveries.iter().map(|d| d.delivered_to).sum::<usize>();
    info!(
        admin_id = %user.id,
        recipients,
        delivered,
        "Direct notification sent"
    );

    Ok(Json(json!({
        "recipients": recipients,
        "persisted": persisted,
        "delivered_connections": delivered,
    })))
}
