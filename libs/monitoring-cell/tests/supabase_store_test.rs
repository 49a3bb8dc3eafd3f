use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use monitoring_cell::error::MonitoringError;
use monitoring_cell::models::{OutgoingNotification, RecipientType, SystemNotification};
use monitoring_cell::store::{MonitoringStore, SweepSource, UserDirectory};
use monitoring_cell::SupabaseMonitoringStore;
use shared_config::{AppConfig, MonitoringConfig};
use shared_database::SupabaseClient;

async fn store_for(server: &MockServer) -> SupabaseMonitoringStore {
    let config = AppConfig {
        supabase_url: server.uri(),
        supabase_anon_key: "service-key".to_string(),
        supabase_jwt_secret: "secret".to_string(),
        monitoring: MonitoringConfig::default(),
    };
    SupabaseMonitoringStore::new(SupabaseClient::new(&config))
}

#[tokio::test]
async fn test_unread_query_filters_orders_and_limits() {
    let server = MockServer::start().await;
    let row = SystemNotification::addressed(
        "u1",
        &OutgoingNotification::new("Line stopped", "Press 4"),
        RecipientType::User,
        Some("u1".to_string()),
    );

    Mock::given(method("GET"))
        .and(path("/rest/v1/system_notifications"))
        .and(query_param("user_id", "eq.u1"))
        .and(query_param("status", "eq.sent"))
        .and(query_param("order", "created_at.desc"))
        .and(query_param("limit", "50"))
        .and(header("apikey", "service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let unread = store.get_unread_notifications("u1", 50).await.unwrap();

    assert_eq!(unread, vec![row]);
}

#[tokio::test]
async fn test_unread_query_encodes_user_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/system_notifications"))
        .and(query_param("user_id", "eq.u1&status=eq.read"))
        .and(query_param("status", "eq.sent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let unread = store
        .get_unread_notifications("u1&status=eq.read", 50)
        .await
        .unwrap();

    assert!(unread.is_empty());
}

#[tokio::test]
async fn test_alert_insert_returns_stored_row() {
    let server = MockServer::start().await;
    let alert = monitoring_cell::services::sweeps::SweepKind::BrokenMachines.alert(1);

    Mock::given(method("POST"))
        .and(path("/rest/v1/system_alerts"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({ "type": "maintenance", "severity": "high" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([alert])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let stored = store.insert_system_alert(&alert).await.unwrap();

    assert_eq!(stored.id, alert.id);
}

#[tokio::test]
async fn test_metric_retention_deletes_by_timestamp() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/performance_metrics"))
        .and(query_param("recorded_at", "lt.2024-03-01T00:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{}, {}, {}])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let cutoff = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

    assert_eq!(store.delete_old_performance_metrics(cutoff).await.unwrap(), 3);
}

#[tokio::test]
async fn test_role_lookup_reads_active_users() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("role", "eq.maintenance"))
        .and(query_param("is_active", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "m1", "email": "m1@plant.test", "role": "maintenance" },
            { "id": "m2", "email": null, "role": "maintenance" }
        ])))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let users = store.get_users_by_role("maintenance").await.unwrap();

    assert_eq!(users.len(), 2);
    assert_eq!(users[0].id, "m1");
}

#[tokio::test]
async fn test_directory_errors_are_directory_failures() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let result = store.get_active_users().await;

    assert_matches!(result, Err(MonitoringError::Directory(_)));
}

#[tokio::test]
async fn test_sweep_counts_come_from_rpc() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/count_low_stock_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(7)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/count_overdue_orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("many")))
        .mount(&server)
        .await;

    let store = store_for(&server).await;

    assert_eq!(store.count_low_stock_items().await.unwrap(), 7);
    assert_matches!(store.count_overdue_orders().await, Err(MonitoringError::Storage(_)));
}

#[tokio::test]
async fn test_storage_failure_surfaces_as_storage_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/monitoring_storage_stats"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let store = store_for(&server).await;

    assert_matches!(store.storage_stats().await, Err(MonitoringError::Storage(_)));
}
