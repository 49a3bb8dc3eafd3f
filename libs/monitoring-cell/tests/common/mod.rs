#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{FutureExt, Stream, StreamExt};

use monitoring_cell::error::MonitoringError;
use monitoring_cell::models::{
    Details, HealthCheckResult, HealthStatus, PerformanceMetric, PushEvent, StorageStats,
    SystemAlert, SystemNotification,
};
use monitoring_cell::services::alerts::{AlertDispatcher, CooldownPolicy};
use monitoring_cell::services::notifications::{HubSettings, NotificationHub};
use monitoring_cell::services::probes::{HealthProbe, ProbeReading};
use monitoring_cell::store::{InMemoryStore, MonitoringStore};
use shared_models::auth::User;

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub hub: Arc<NotificationHub>,
    pub dispatcher: Arc<AlertDispatcher>,
}

pub async fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    store.add_user(User::new("admin-1").with_role("admin")).await;
    store.add_user(User::new("operator-1").with_role("production_manager")).await;

    let hub = NotificationHub::new(store.clone(), store.clone(), HubSettings::default());
    let dispatcher = Arc::new(AlertDispatcher::new(
        store.clone(),
        hub.clone(),
        CooldownPolicy::default(),
        vec!["admin".to_string()],
        Duration::from_secs(5),
    ));

    Harness {
        store,
        hub,
        dispatcher,
    }
}

pub fn result(check_name: &str, status: HealthStatus) -> HealthCheckResult {
    HealthCheckResult {
        check_name: check_name.to_string(),
        check_name_localized: check_name.to_string(),
        status,
        duration_ms: 12,
        details: Details::new(),
        error: None,
        checked_at: Utc::now(),
    }
}

/// Everything already buffered on a push stream, without waiting.
pub fn drain<S>(stream: &mut S) -> Vec<PushEvent>
where
    S: Stream<Item = PushEvent> + Unpin,
{
    let mut events = Vec::new();
    while let Some(Some(event)) = stream.next().now_or_never() {
        events.push(event);
    }
    events
}

pub enum Step {
    Value(f64),
    Fail,
    NoSignal,
    Hang,
}

/// Probe that replays a fixed script of readings; healthy once the script runs out.
pub struct ScriptedProbe {
    name: &'static str,
    steps: Mutex<VecDeque<Step>>,
}

impl ScriptedProbe {
    pub fn new(name: &'static str, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            name,
            steps: Mutex::new(steps.into()),
        })
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    fn name(&self) -> &'static str {
        self.name
    }

    fn display_name(&self) -> &'static str {
        self.name
    }

    async fn probe(&self) -> Result<ProbeReading, MonitoringError> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Value(value)) => Ok(ProbeReading::with_signal(value)),
            Some(Step::Fail) => Err(MonitoringError::ProbeFailed("connection refused".to_string())),
            Some(Step::NoSignal) => Err(MonitoringError::Unavailable("no source on this platform".to_string())),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ProbeReading::default())
            }
            None => Ok(ProbeReading::with_signal(0.0)),
        }
    }
}

/// Store whose performance-metric writes and deletes never complete.
pub struct StalledMetricsStore {
    pub inner: Arc<InMemoryStore>,
}

impl StalledMetricsStore {
    async fn stall() {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}

#[async_trait]
impl MonitoringStore for StalledMetricsStore {
    async fn ping(&self) -> Result<(), MonitoringError> {
        self.inner.ping().await
    }

    async fn storage_stats(&self) -> Result<StorageStats, MonitoringError> {
        self.inner.storage_stats().await
    }

    async fn insert_health_check_result(&self, row: &HealthCheckResult) -> Result<(), MonitoringError> {
        self.inner.insert_health_check_result(row).await
    }

    async fn insert_performance_metric(&self, _row: &PerformanceMetric) -> Result<(), MonitoringError> {
        Self::stall().await;
        Ok(())
    }

    async fn insert_system_alert(&self, row: &SystemAlert) -> Result<SystemAlert, MonitoringError> {
        self.inner.insert_system_alert(row).await
    }

    async fn insert_system_notification(
        &self,
        row: &SystemNotification,
    ) -> Result<SystemNotification, MonitoringError> {
        self.inner.insert_system_notification(row).await
    }

    async fn get_unread_notifications(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SystemNotification>, MonitoringError> {
        self.inner.get_unread_notifications(user_id, limit).await
    }

    async fn delete_old_performance_metrics(&self, _older_than: DateTime<Utc>) -> Result<u64, MonitoringError> {
        Self::stall().await;
        Ok(0)
    }
}
