// =====================================================================================
// ALERT DISPATCHER
// =====================================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_config::MonitoringConfig;

use crate::models::{
    ActionPriority, AlertCategory, AlertSeverity, AlertType, HealthCheckResult, HealthStatus,
    OutgoingNotification, SuggestedAction, SystemAlert,
};
use crate::services::notifications::NotificationHub;
use crate::store::MonitoringStore;

/// Cooldown windows by key family.
#[derive(Debug, Clone)]
pub struct CooldownPolicy {
    pub storage: Duration,
    pub memory: Duration,
    pub default: Duration,
}

impl From<&MonitoringConfig> for CooldownPolicy {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            storage: config.storage_cooldown,
            memory: config.memory_cooldown,
            default: config.default_cooldown,
        }
    }
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self::from(&MonitoringConfig::default())
    }
}

impl CooldownPolicy {
    pub fn window_for(&self, key: &str) -> Duration {
        match ProbeFamily::of(key) {
            ProbeFamily::Memory => self.memory,
            ProbeFamily::Storage => self.storage,
            ProbeFamily::Other => self.default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeFamily {
    Storage,
    Memory,
    Other,
}

impl ProbeFamily {
    fn of(key: &str) -> Self {
        if key.contains("memory") {
            ProbeFamily::Memory
        } else if key.contains("storage") || key.contains("database") {
            ProbeFamily::Storage
        } else {
            ProbeFamily::Other
        }
    }

    fn suggested_actions(self) -> Vec<SuggestedAction> {
        match self {
            ProbeFamily::Storage => vec![
                SuggestedAction::new(
                    "check_connections",
                    ActionPriority::High,
                    "Check storage connections and the connection pool",
                ),
                SuggestedAction::new(
                    "restart_storage_service",
                    ActionPriority::Medium,
                    "Restart the storage service if connections do not recover",
                ),
            ],
            ProbeFamily::Memory => vec![
                SuggestedAction::new(
                    "review_memory_usage",
                    ActionPriority::High,
                    "Review process memory usage for leaks or oversized caches",
                ),
                SuggestedAction::new(
                    "restart_process",
                    ActionPriority::Medium,
                    "Restart the process to reclaim memory",
                ),
            ],
            ProbeFamily::Other => vec![SuggestedAction::new(
                "investigate",
                ActionPriority::Medium,
                "Inspect the check details and recent logs",
            )],
        }
    }
}

pub fn cooldown_key(check_name: &str, status: HealthStatus) -> String {
    format!("{}:{}", check_name, status.as_str())
}

/// Rate-limits alerts per key, persists them and hands them to the hub.
pub struct AlertDispatcher {
    cooldowns: Mutex<HashMap<String, Instant>>,
    policy: CooldownPolicy,
    alert_roles: Vec<String>,
    store: Arc<dyn MonitoringStore>,
    hub: Arc<NotificationHub>,
    store_timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(
        store: Arc<dyn MonitoringStore>,
        hub: Arc<NotificationHub>,
        policy: CooldownPolicy,
        alert_roles: Vec<String>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            cooldowns: Mutex::new(HashMap::new()),
            policy,
            alert_roles,
            store,
            hub,
            store_timeout,
        }
    }

    pub fn from_config(
        config: &MonitoringConfig,
        store: Arc<dyn MonitoringStore>,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self::new(
            store,
            hub,
            CooldownPolicy::from(config),
            config.alert_roles.clone(),
            config.probe_timeout,
        )
    }

    /// Emits an alert for a degraded health result unless its key is cooling down.
    #[instrument(skip(self, result), fields(check = %result.check_name, status = %result.status))]
    pub async fn maybe_alert(&self, result: &HealthCheckResult) -> bool {
        if !result.status.is_alertable() {
            return false;
        }

        let key = cooldown_key(&result.check_name, result.status);
        if !self.try_acquire(&key).await {
            return false;
        }

        let alert = self.health_alert(result);
        self.emit(alert).await;
        true
    }

    /// Emits a prebuilt alert under an explicit cooldown key.
    pub async fn dispatch(&self, key: &str, alert: SystemAlert) -> bool {
        if !self.try_acquire(key).await {
            return false;
        }
        self.emit(alert).await;
        true
    }

    /// Check-and-record under one lock so concurrent callers cannot both pass.
    async fn try_acquire(&self, key: &str) -> bool {
        let window = self.policy.window_for(key);
        let now = Instant::now();
        let mut cooldowns = self.cooldowns.lock().await;

        if let Some(last_sent) = cooldowns.get(key) {
            let elapsed = now.duration_since(*last_sent);
            if elapsed < window {
                debug!(
                    key = %key,
                    remaining_seconds = (window - elapsed).as_secs(),
                    "Alert suppressed by cooldown"
                );
                return false;
            }
        }

        cooldowns.insert(key.to_string(), now);
        true
    }

    /// Drops every cooldown entry recorded for `check_name`, so the next regression
    /// alerts immediately.
    pub async fn clear_cooldowns(&self, check_name: &str) -> usize {
        let prefix = format!("{}:", check_name);
        let mut cooldowns = self.cooldowns.lock().await;
        let before = cooldowns.len();
        cooldowns.retain(|key, _| key != check_name && !key.starts_with(&prefix));
        let cleared = before - cooldowns.len();
        if cleared > 0 {
            info!(check = %check_name, cleared, "Cleared alert cooldowns after recovery");
        }
        cleared
    }

    /// Forgets entries last sent more than `max_age` ago.
    pub async fn prune_cooldowns(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut cooldowns = self.cooldowns.lock().await;
        let before = cooldowns.len();
        cooldowns.retain(|_, last_sent| now.duration_since(*last_sent) <= max_age);
        before - cooldowns.len()
    }

    pub async fn cooldown_count(&self) -> usize {
        self.cooldowns.lock().await.len()
    }

    fn health_alert(&self, result: &HealthCheckResult) -> SystemAlert {
        let family = ProbeFamily::of(&result.check_name);
        let (category, severity) = match result.status {
            HealthStatus::Critical => (AlertCategory::Critical, AlertSeverity::Critical),
            _ => (AlertCategory::Warning, AlertSeverity::Medium),
        };

        let mut message = format!(
            "Health check {} reported {} after {} ms",
            result.check_name, result.status, result.duration_ms
        );
        if let Some(error) = &result.error {
            message.push_str(&format!(": {}", error));
        }

        let mut context_data = result.details.clone();
        context_data.insert("status".to_string(), Value::from(result.status.as_str()));
        context_data.insert("duration_ms".to_string(), Value::from(result.duration_ms));

        SystemAlert {
            id: Uuid::new_v4(),
            title: format!("{} is {}", result.check_name_localized, result.status),
            title_localized: Some(result.check_name_localized.clone()),
            message,
            message_localized: None,
            alert_type: AlertType::System,
            category,
            severity,
            source: "health_monitor".to_string(),
            source_id: result.check_name.clone(),
            context_data,
            suggested_actions: family.suggested_actions(),
            target_users: Vec::new(),
            target_roles: self.alert_roles.clone(),
            requires_action: severity == AlertSeverity::Critical,
            created_at: Utc::now(),
        }
    }

    async fn emit(&self, alert: SystemAlert) {
        match alert.severity {
            AlertSeverity::Critical | AlertSeverity::High => error!(
                alert_id = %alert.id,
                source_id = %alert.source_id,
                severity = ?alert.severity,
                "ALERT: {}", alert.title
            ),
            _ => warn!(
                alert_id = %alert.id,
                source_id = %alert.source_id,
                severity = ?alert.severity,
                "ALERT: {}", alert.title
            ),
        }

        let alert = match timeout(self.store_timeout, self.store.insert_system_alert(&alert)).await {
            Ok(Ok(stored)) => stored,
            Ok(Err(e)) => {
                warn!(alert_id = %alert.id, error = %e, "Failed to persist alert, delivering anyway");
                alert
            }
            Err(_) => {
                warn!(alert_id = %alert.id, "Timed out persisting alert, delivering anyway");
                alert
            }
        };

        if !alert.has_targets() {
            debug!(alert_id = %alert.id, "Alert has no targets, persisted only");
            return;
        }

        let notification = OutgoingNotification::from(&alert);
        for user_id in &alert.target_users {
            self.hub.send_to_user(user_id, &notification).await;
        }
        for role in &alert.target_roles {
            if let Err(e) = self.hub.send_to_role(role, &notification).await {
                error!(alert_id = %alert.id, role = %role, error = %e, "Failed to deliver alert to role");
            }
        }
    }
}
