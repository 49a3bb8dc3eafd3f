// =====================================================================================
// MONITORING CELL MODELS
// =====================================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Free-form diagnostic payload attached to probe results and alerts.
pub type Details = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl HealthStatus {
    /// Total order used to detect improvement between cycles.
    pub fn severity(self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Critical => 2,
            HealthStatus::Unknown => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        }
    }

    /// Statuses that are forwarded to the alert dispatcher.
    pub fn is_alertable(self) -> bool {
        matches!(self, HealthStatus::Warning | HealthStatus::Critical)
    }

    pub fn improved_from(self, previous: HealthStatus) -> bool {
        self.severity() < previous.severity()
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub check_name: String,
    pub check_name_localized: String,
    pub status: HealthStatus,
    pub duration_ms: u64,
    pub details: Details,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub metric_name: String,
    pub metric_value: f64,
    pub unit: String,
    pub source: String,
    pub recorded_at: DateTime<Utc>,
}

/// Round-trip statistics reported by the storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    pub active_connections: u64,
    pub database_size_bytes: u64,
}

// =====================================================================================
// ALERTS
// =====================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    System,
    Production,
    Quality,
    Inventory,
    Maintenance,
    Security,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Info,
    Warning,
    Error,
    Critical,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub action: String,
    pub priority: ActionPriority,
    pub description: String,
}

impl SuggestedAction {
    pub fn new(action: &str, priority: ActionPriority, description: &str) -> Self {
        Self {
            action: action.to_string(),
            priority,
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemAlert {
    pub id: Uuid,
    pub title: String,
    pub title_localized: Option<String>,
    pub message: String,
    pub message_localized: Option<String>,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub source: String,
    pub source_id: String,
    pub context_data: Details,
    pub suggested_actions: Vec<SuggestedAction>,
    pub target_users: Vec<String>,
    pub target_roles: Vec<String>,
    pub requires_action: bool,
    pub created_at: DateTime<Utc>,
}

impl SystemAlert {
    pub fn has_targets(&self) -> bool {
        !self.target_users.is_empty() || !self.target_roles.is_empty()
    }
}

// =====================================================================================
// NOTIFICATIONS
// =====================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Info,
    Success,
    Warning,
    Error,
    Alert,
    System,
}

impl NotificationType {
    pub fn icon(self) -> &'static str {
        match self {
            NotificationType::Info => "info",
            NotificationType::Success => "check-circle",
            NotificationType::Warning => "alert-triangle",
            NotificationType::Error => "x-circle",
            NotificationType::Alert => "bell",
            NotificationType::System => "settings",
        }
    }
}

impl From<AlertCategory> for NotificationType {
    fn from(category: AlertCategory) -> Self {
        match category {
            AlertCategory::Info => NotificationType::Info,
            AlertCategory::Warning => NotificationType::Warning,
            AlertCategory::Error => NotificationType::Error,
            AlertCategory::Critical => NotificationType::Alert,
            AlertCategory::Success => NotificationType::Success,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl NotificationPriority {
    pub fn plays_sound(self) -> bool {
        matches!(self, NotificationPriority::High | NotificationPriority::Urgent)
    }
}

impl From<AlertSeverity> for NotificationPriority {
    fn from(severity: AlertSeverity) -> Self {
        match severity {
            AlertSeverity::Low => NotificationPriority::Low,
            AlertSeverity::Medium => NotificationPriority::Normal,
            AlertSeverity::High => NotificationPriority::High,
            AlertSeverity::Critical => NotificationPriority::Urgent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientType {
    User,
    Group,
    Role,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent,
}

/// Content of a notification before it is addressed to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingNotification {
    pub title: String,
    #[serde(default)]
    pub title_localized: Option<String>,
    pub message: String,
    #[serde(default)]
    pub message_localized: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: NotificationPriority,
    #[serde(default)]
    pub context_type: Option<String>,
    #[serde(default)]
    pub context_id: Option<String>,
}

impl OutgoingNotification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            title_localized: None,
            message: message.into(),
            message_localized: None,
            notification_type: NotificationType::Info,
            priority: NotificationPriority::Normal,
            context_type: None,
            context_id: None,
        }
    }

    pub fn with_type(mut self, notification_type: NotificationType) -> Self {
        self.notification_type = notification_type;
        self
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, context_type: &str, context_id: impl Into<String>) -> Self {
        self.context_type = Some(context_type.to_string());
        self.context_id = Some(context_id.into());
        self
    }
}

impl From<&SystemAlert> for OutgoingNotification {
    fn from(alert: &SystemAlert) -> Self {
        Self {
            title: alert.title.clone(),
            title_localized: alert.title_localized.clone(),
            message: alert.message.clone(),
            message_localized: alert.message_localized.clone(),
            notification_type: alert.category.into(),
            priority: alert.severity.into(),
            context_type: Some("system_alert".to_string()),
            context_id: Some(alert.id.to_string()),
        }
    }
}

/// Per-user materialization of a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemNotification {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub title_localized: Option<String>,
    pub message: String,
    pub message_localized: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: NotificationPriority,
    pub recipient_type: RecipientType,
    pub recipient_id: Option<String>,
    pub context_type: Option<String>,
    pub context_id: Option<String>,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
}

impl SystemNotification {
    pub fn addressed(
        user_id: &str,
        notification: &OutgoingNotification,
        recipient_type: RecipientType,
        recipient_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: notification.title.clone(),
            title_localized: notification.title_localized.clone(),
            message: notification.message.clone(),
            message_localized: notification.message_localized.clone(),
            notification_type: notification.notification_type,
            priority: notification.priority,
            recipient_type,
            recipient_id,
            context_type: notification.context_type.clone(),
            context_id: notification.context_id.clone(),
            status: NotificationStatus::Sent,
            created_at: Utc::now(),
        }
    }
}

// =====================================================================================
// PUSH EVENTS
// =====================================================================================

/// Body of a `notification` push event, with client delivery hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_localized: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_localized: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: NotificationPriority,
    pub context_type: Option<String>,
    pub context_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sound: bool,
    pub icon: String,
}

impl From<&SystemNotification> for NotificationPayload {
    fn from(n: &SystemNotification) -> Self {
        Self {
            id: n.id,
            title: n.title.clone(),
            title_localized: n.title_localized.clone(),
            message: n.message.clone(),
            message_localized: n.message_localized.clone(),
            notification_type: n.notification_type,
            priority: n.priority,
            context_type: n.context_type.clone(),
            context_id: n.context_id.clone(),
            created_at: n.created_at,
            sound: n.priority.plays_sound(),
            icon: n.notification_type.icon().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Connected {
        connection_id: String,
        user_id: String,
        server_time: DateTime<Utc>,
    },
    RecentNotifications(Vec<NotificationPayload>),
    Notification(NotificationPayload),
    Heartbeat {
        timestamp: DateTime<Utc>,
    },
}

impl PushEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::Connected { .. } => "connected",
            PushEvent::RecentNotifications(_) => "recent_notifications",
            PushEvent::Notification(_) => "notification",
            PushEvent::Heartbeat { .. } => "heartbeat",
        }
    }

    pub fn data(&self) -> Value {
        match self {
            PushEvent::Connected {
                connection_id,
                user_id,
                server_time,
            } => serde_json::json!({
                "connection_id": connection_id,
                "user_id": user_id,
                "server_time": server_time,
            }),
            PushEvent::RecentNotifications(notifications) => serde_json::json!({
                "count": notifications.len(),
                "notifications": notifications,
            }),
            PushEvent::Notification(payload) => {
                serde_json::to_value(payload).unwrap_or(Value::Null)
            }
            PushEvent::Heartbeat { timestamp } => serde_json::json!({ "timestamp": timestamp }),
        }
    }
}

// =====================================================================================
// ADMINISTRATIVE VIEWS
// =====================================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionStats {
    pub active_connections: usize,
    pub connections_by_user: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub monitoring_active: bool,
    pub health_checks_active: bool,
    pub last_results: Vec<HealthCheckResult>,
    pub rule_count: usize,
}

/// Direct message submitted through the admin endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SendNotificationRequest {
    pub recipient_type: RecipientType,
    pub recipient_id: Option<String>,
    #[serde(flatten)]
    pub notification: OutgoingNotification,
}
