// =====================================================================================
// SUPABASE-BACKED STORE
// =====================================================================================

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, Url};
use serde_json::{json, Value};
use tracing::debug;

use shared_database::SupabaseClient;
use shared_models::auth::User;

use crate::error::MonitoringError;
use crate::models::{
    HealthCheckResult, PerformanceMetric, StorageStats, SystemAlert, SystemNotification,
};
use crate::store::{MonitoringStore, SweepSource, UserDirectory};

const HEALTH_CHECK_RESULTS: &str = "health_check_results";
const PERFORMANCE_METRICS: &str = "performance_metrics";
const SYSTEM_ALERTS: &str = "system_alerts";
const SYSTEM_NOTIFICATIONS: &str = "system_notifications";
const USERS: &str = "users";
const USER_COLUMNS: &str = "id,email,role,metadata,created_at";
const QUERY_ORIGIN: &str = "http://postgrest.local";

/// Persists monitoring rows through PostgREST and reads users and domain counters
/// from the same project.
#[derive(Clone)]
pub struct SupabaseMonitoringStore {
    supabase: SupabaseClient,
}

impl SupabaseMonitoringStore {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    async fn count(&self, function: &str) -> Result<u64, MonitoringError> {
        let count: Value = self.supabase.rpc(function, json!({})).await?;
        count
            .as_u64()
            .or_else(|| count.as_f64().map(|c| c.max(0.0) as u64))
            .ok_or_else(|| MonitoringError::Storage(format!("{} returned a non-numeric count", function)))
    }

    async fn users(&self, filters: &[(&str, String)]) -> Result<Vec<User>, MonitoringError> {
        let mut params = filters.to_vec();
        params.push(("select", USER_COLUMNS.to_string()));
        let path = table_query(USERS, &params).map_err(|e| MonitoringError::Directory(e.to_string()))?;
        self.supabase
            .request::<Vec<User>>(Method::GET, &path, None)
            .await
            .map_err(|e| MonitoringError::Directory(e.to_string()))
    }
}

/// `/rest/v1/<table>?...` with every filter value percent-encoded.
fn table_query(table: &str, params: &[(&str, String)]) -> Result<String, MonitoringError> {
    let url = Url::parse_with_params(&format!("{}/rest/v1/{}", QUERY_ORIGIN, table), params)
        .map_err(|e| MonitoringError::Storage(e.to_string()))?;
    Ok(format!("{}?{}", url.path(), url.query().unwrap_or_default()))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl MonitoringStore for SupabaseMonitoringStore {
    async fn ping(&self) -> Result<(), MonitoringError> {
        let path = format!("/rest/v1/{}?select=check_name&limit=1", HEALTH_CHECK_RESULTS);
        self.supabase.request::<Value>(Method::GET, &path, None).await?;
        Ok(())
    }

    async fn storage_stats(&self) -> Result<StorageStats, MonitoringError> {
        Ok(self.supabase.rpc("monitoring_storage_stats", json!({})).await?)
    }

    async fn insert_health_check_result(&self, row: &HealthCheckResult) -> Result<(), MonitoringError> {
        Ok(self.supabase.insert(HEALTH_CHECK_RESULTS, row).await?)
    }

    async fn insert_performance_metric(&self, row: &PerformanceMetric) -> Result<(), MonitoringError> {
        Ok(self.supabase.insert(PERFORMANCE_METRICS, row).await?)
    }

    async fn insert_system_alert(&self, row: &SystemAlert) -> Result<SystemAlert, MonitoringError> {
        Ok(self.supabase.insert_returning(SYSTEM_ALERTS, row).await?)
    }

    async fn insert_system_notification(
        &self,
        row: &SystemNotification,
    ) -> Result<SystemNotification, MonitoringError> {
        Ok(self.supabase.insert_returning(SYSTEM_NOTIFICATIONS, row).await?)
    }

    async fn get_unread_notifications(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SystemNotification>, MonitoringError> {
        let path = table_query(
            SYSTEM_NOTIFICATIONS,
            &[
                ("user_id", format!("eq.{}", user_id)),
                ("status", "eq.sent".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )?;
        Ok(self.supabase.request(Method::GET, &path, None).await?)
    }

    async fn delete_old_performance_metrics(&self, older_than: DateTime<Utc>) -> Result<u64, MonitoringError> {
        let filter = format!("recorded_at=lt.{}", timestamp(older_than));
        let deleted = self.supabase.delete_where(PERFORMANCE_METRICS, &filter).await?;
        debug!(deleted, "Deleted performance metrics");
        Ok(deleted)
    }
}

#[async_trait]
impl UserDirectory for SupabaseMonitoringStore {
    async fn get_users_by_role(&self, role_id: &str) -> Result<Vec<User>, MonitoringError> {
        self.users(&[
            ("role", format!("eq.{}", role_id)),
            ("is_active", "eq.true".to_string()),
        ])
        .await
    }

    async fn get_active_users(&self) -> Result<Vec<User>, MonitoringError> {
        self.users(&[("is_active", "eq.true".to_string())]).await
    }
}

#[async_trait]
impl SweepSource for SupabaseMonitoringStore {
    async fn count_overdue_orders(&self) -> Result<u64, MonitoringError> {
        self.count("count_overdue_orders").await
    }

    async fn count_broken_machines(&self) -> Result<u64, MonitoringError> {
        self.count("count_broken_machines").await
    }

    async fn count_low_stock_items(&self) -> Result<u64, MonitoringError> {
        self.count("count_low_stock_items").await
    }
}
