// =====================================================================================
// STORAGE AND DIRECTORY COLLABORATORS
// =====================================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use shared_models::auth::User;

use crate::error::MonitoringError;
use crate::models::{
    HealthCheckResult, PerformanceMetric, StorageStats, SystemAlert, SystemNotification,
};

/// Persistence used by the engine. Every call may fail; callers decide whether the
/// failure is fatal.
#[async_trait]
pub trait MonitoringStore: Send + Sync {
    /// Trivial round-trip used by the connectivity probe.
    async fn ping(&self) -> Result<(), MonitoringError>;
    async fn storage_stats(&self) -> Result<StorageStats, MonitoringError>;
    async fn insert_health_check_result(&self, row: &HealthCheckResult) -> Result<(), MonitoringError>;
    async fn insert_performance_metric(&self, row: &PerformanceMetric) -> Result<(), MonitoringError>;
    async fn insert_system_alert(&self, row: &SystemAlert) -> Result<SystemAlert, MonitoringError>;
    async fn insert_system_notification(
        &self,
        row: &SystemNotification,
    ) -> Result<SystemNotification, MonitoringError>;
    /// Unread notifications for a user, newest first.
    async fn get_unread_notifications(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SystemNotification>, MonitoringError>;
    async fn delete_old_performance_metrics(&self, older_than: DateTime<Utc>) -> Result<u64, MonitoringError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_users_by_role(&self, role_id: &str) -> Result<Vec<User>, MonitoringError>;
    async fn get_active_users(&self) -> Result<Vec<User>, MonitoringError>;
}

/// Counters backing the domain sweeps.
#[async_trait]
pub trait SweepSource: Send + Sync {
    async fn count_overdue_orders(&self) -> Result<u64, MonitoringError>;
    async fn count_broken_machines(&self) -> Result<u64, MonitoringError>;
    async fn count_low_stock_items(&self) -> Result<u64, MonitoringError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepCounts {
    pub overdue_orders: u64,
    pub broken_machines: u64,
    pub low_stock_items: u64,
}

/// Process-local store used when no database is configured and by the test suite.
#[derive(Default)]
pub struct InMemoryStore {
    health_results: RwLock<Vec<HealthCheckResult>>,
    metrics: RwLock<Vec<PerformanceMetric>>,
    alerts: RwLock<Vec<SystemAlert>>,
    notifications: RwLock<Vec<SystemNotification>>,
    users: RwLock<Vec<User>>,
    sweep_counts: RwLock<SweepCounts>,
    latency: RwLock<Duration>,
    unread_latency: RwLock<Duration>,
    fail_storage: AtomicBool,
    fail_directory: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user: User) {
        self.users.write().await.push(user);
    }

    pub async fn set_sweep_counts(&self, counts: SweepCounts) {
        *self.sweep_counts.write().await = counts;
    }

    /// Artificial delay applied to `ping` and `storage_stats`.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = latency;
    }

    /// Artificial delay applied to the unread-notification query.
    pub async fn set_unread_latency(&self, latency: Duration) {
        *self.unread_latency.write().await = latency;
    }

    pub fn set_storage_failing(&self, failing: bool) {
        self.fail_storage.store(failing, Ordering::SeqCst);
    }

    pub fn set_directory_failing(&self, failing: bool) {
        self.fail_directory.store(failing, Ordering::SeqCst);
    }

    pub async fn health_results(&self) -> Vec<HealthCheckResult> {
        self.health_results.read().await.clone()
    }

    pub async fn metrics(&self) -> Vec<PerformanceMetric> {
        self.metrics.read().await.clone()
    }

    pub async fn alerts(&self) -> Vec<SystemAlert> {
        self.alerts.read().await.clone()
    }

    pub async fn notifications(&self) -> Vec<SystemNotification> {
        self.notifications.read().await.clone()
    }

    fn check_storage(&self) -> Result<(), MonitoringError> {
        if self.fail_storage.load(Ordering::SeqCst) {
            return Err(MonitoringError::Storage("storage unavailable".to_string()));
        }
        Ok(())
    }

    fn check_directory(&self) -> Result<(), MonitoringError> {
        if self.fail_directory.load(Ordering::SeqCst) {
            return Err(MonitoringError::Directory("directory unavailable".to_string()));
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.read().await;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl MonitoringStore for InMemoryStore {
    async fn ping(&self) -> Result<(), MonitoringError> {
        self.simulate_latency().await;
        self.check_storage()
    }

    async fn storage_stats(&self) -> Result<StorageStats, MonitoringError> {
        self.simulate_latency().await;
        self.check_storage()?;

        let rows = self.health_results.read().await.len()
            + self.metrics.read().await.len()
            + self.alerts.read().await.len()
            + self.notifications.read().await.len();

        Ok(StorageStats {
            active_connections: 1,
            database_size_bytes: (rows * 512) as u64,
        })
    }

    async fn insert_health_check_result(&self, row: &HealthCheckResult) -> Result<(), MonitoringError> {
        self.check_storage()?;
        self.health_results.write().await.push(row.clone());
        Ok(())
    }

    async fn insert_performance_metric(&self, row: &PerformanceMetric) -> Result<(), MonitoringError> {
        self.check_storage()?;
        self.metrics.write().await.push(row.clone());
        Ok(())
    }

    async fn insert_system_alert(&self, row: &SystemAlert) -> Result<SystemAlert, MonitoringError> {
        self.check_storage()?;
        self.alerts.write().await.push(row.clone());
        Ok(row.clone())
    }

    async fn insert_system_notification(
        &self,
        row: &SystemNotification,
    ) -> Result<SystemNotification, MonitoringError> {
        self.check_storage()?;
        self.notifications.write().await.push(row.clone());
        Ok(row.clone())
    }

    async fn get_unread_notifications(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SystemNotification>, MonitoringError> {
        self.check_storage()?;

        let notifications = self.notifications.read().await;
        let mut unread: Vec<SystemNotification> = notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        drop(notifications);
        unread.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        unread.truncate(limit);

        let latency = *self.unread_latency.read().await;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(unread)
    }

    async fn delete_old_performance_metrics(&self, older_than: DateTime<Utc>) -> Result<u64, MonitoringError> {
        self.check_storage()?;

        let mut metrics = self.metrics.write().await;
        let before = metrics.len();
        metrics.retain(|m| m.recorded_at >= older_than);
        Ok((before - metrics.len()) as u64)
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn get_users_by_role(&self, role_id: &str) -> Result<Vec<User>, MonitoringError> {
        self.check_directory()?;
        Ok(self
            .users
            .read()
            .await
            .iter()
            .filter(|u| u.role.as_deref() == Some(role_id))
            .cloned()
            .collect())
    }

    async fn get_active_users(&self) -> Result<Vec<User>, MonitoringError> {
        self.check_directory()?;
        Ok(self.users.read().await.clone())
    }
}

#[async_trait]
impl SweepSource for InMemoryStore {
    async fn count_overdue_orders(&self) -> Result<u64, MonitoringError> {
        self.check_storage()?;
        Ok(self.sweep_counts.read().await.overdue_orders)
    }

    async fn count_broken_machines(&self) -> Result<u64, MonitoringError> {
        self.check_storage()?;
        Ok(self.sweep_counts.read().await.broken_machines)
    }

    async fn count_low_stock_items(&self) -> Result<u64, MonitoringError> {
        self.check_storage()?;
        Ok(self.sweep_counts.read().await.low_stock_items)
    }
}
