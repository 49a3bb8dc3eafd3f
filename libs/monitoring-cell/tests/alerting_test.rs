mod common;

use std::sync::Arc;
use std::time::Duration;

use monitoring_cell::models::{
    AlertSeverity, HealthStatus, NotificationPriority, NotificationType, PushEvent,
};
use monitoring_cell::services::health::HealthCheckEngine;
use monitoring_cell::services::notifications::ChannelTransport;
use monitoring_cell::services::probes::HealthProbe;
use monitoring_cell::services::sweeps::DomainSweeper;
use monitoring_cell::store::SweepCounts;
use monitoring_cell::thresholds::{ThresholdSet, PROCESS_MEMORY, STORAGE_CONNECTIVITY};

use common::{drain, harness, result, ScriptedProbe, Step};

// ===== COOLDOWNS =====

#[tokio::test(start_paused = true)]
async fn repeated_alert_is_suppressed_until_window_elapses() {
    let h = harness().await;
    let critical = result(STORAGE_CONNECTIVITY, HealthStatus::Critical);

    assert!(h.dispatcher.maybe_alert(&critical).await);
    assert!(!h.dispatcher.maybe_alert(&critical).await);

    tokio::time::advance(Duration::from_secs(299)).await;
    assert!(!h.dispatcher.maybe_alert(&critical).await);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(h.dispatcher.maybe_alert(&critical).await);

    assert_eq!(h.store.alerts().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn memory_alerts_use_the_longer_window() {
    let h = harness().await;
    let warning = result(PROCESS_MEMORY, HealthStatus::Warning);

    assert!(h.dispatcher.maybe_alert(&warning).await);
    tokio::time::advance(Duration::from_secs(301)).await;
    assert!(!h.dispatcher.maybe_alert(&warning).await);
    tokio::time::advance(Duration::from_secs(300)).await;
    assert!(h.dispatcher.maybe_alert(&warning).await);
}

#[tokio::test]
async fn warning_and_critical_cool_down_independently() {
    let h = harness().await;

    assert!(h.dispatcher.maybe_alert(&result(STORAGE_CONNECTIVITY, HealthStatus::Warning)).await);
    assert!(h.dispatcher.maybe_alert(&result(STORAGE_CONNECTIVITY, HealthStatus::Critical)).await);
    assert_eq!(h.dispatcher.cooldown_count().await, 2);
}

#[tokio::test]
async fn healthy_and_unknown_results_never_alert() {
    let h = harness().await;

    assert!(!h.dispatcher.maybe_alert(&result(STORAGE_CONNECTIVITY, HealthStatus::Healthy)).await);
    assert!(!h.dispatcher.maybe_alert(&result(STORAGE_CONNECTIVITY, HealthStatus::Unknown)).await);
    assert!(h.store.alerts().await.is_empty());
}

#[tokio::test]
async fn concurrent_callers_emit_once() {
    let h = harness().await;
    let critical = result(STORAGE_CONNECTIVITY, HealthStatus::Critical);

    let outcomes = futures::future::join_all(
        (0..8).map(|_| h.dispatcher.maybe_alert(&critical)),
    )
    .await;

    assert_eq!(outcomes.iter().filter(|sent| **sent).count(), 1);
    assert_eq!(h.store.alerts().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn retention_prunes_only_old_cooldowns() {
    let h = harness().await;
    h.dispatcher.maybe_alert(&result(STORAGE_CONNECTIVITY, HealthStatus::Critical)).await;
    tokio::time::advance(Duration::from_secs(25 * 3600)).await;
    h.dispatcher.maybe_alert(&result(PROCESS_MEMORY, HealthStatus::Warning)).await;

    let pruned = h.dispatcher.prune_cooldowns(Duration::from_secs(24 * 3600)).await;
    assert_eq!(pruned, 1);
    assert_eq!(h.dispatcher.cooldown_count().await, 1);
}

// ===== DELIVERY =====

#[tokio::test]
async fn critical_alert_reaches_connected_admin() {
    let h = harness().await;
    let (transport, receiver) = ChannelTransport::channel(8);
    h.hub
        .add_connection("c1".to_string(), "admin-1".to_string(), transport)
        .await
        .unwrap();
    let mut stream = Box::pin(receiver.into_stream());
    drain(&mut stream);

    h.dispatcher.maybe_alert(&result(STORAGE_CONNECTIVITY, HealthStatus::Critical)).await;

    let events = drain(&mut stream);
    assert_eq!(events.len(), 1);
    let PushEvent::Notification(payload) = &events[0] else {
        panic!("expected a notification, got {:?}", events[0]);
    };
    assert_eq!(payload.notification_type, NotificationType::Alert);
    assert_eq!(payload.priority, NotificationPriority::Urgent);
    assert!(payload.sound);
    assert_eq!(payload.context_type.as_deref(), Some("system_alert"));

    let alert = &h.store.alerts().await[0];
    assert_eq!(alert.severity, AlertSeverity::Critical);
    assert!(alert.requires_action);
    assert_eq!(alert.suggested_actions[0].action, "check_connections");
    assert_eq!(payload.context_id, Some(alert.id.to_string()));
}

#[tokio::test]
async fn persistence_failure_still_delivers_live() {
    let h = harness().await;
    let (transport, receiver) = ChannelTransport::channel(8);
    h.hub
        .add_connection("c1".to_string(), "admin-1".to_string(), transport)
        .await
        .unwrap();
    let mut stream = Box::pin(receiver.into_stream());
    drain(&mut stream);

    h.store.set_storage_failing(true);
    assert!(h.dispatcher.maybe_alert(&result(PROCESS_MEMORY, HealthStatus::Warning)).await);

    let events = drain(&mut stream);
    assert!(matches!(events.as_slice(), [PushEvent::Notification(_)]));
    assert!(h.store.alerts().await.is_empty());
}

#[tokio::test]
async fn explicit_target_users_are_addressed_individually() {
    let h = harness().await;
    let mut alert = monitoring_cell::services::sweeps::SweepKind::LowStock.alert(3);
    alert.target_roles.clear();
    alert.target_users = vec!["operator-1".to_string(), "admin-1".to_string()];

    assert!(h.dispatcher.dispatch("low_stock", alert.clone()).await);

    let rows = h.store.notifications().await;
    let mut recipients: Vec<&str> = rows.iter().map(|r| r.user_id.as_str()).collect();
    recipients.sort();
    assert_eq!(recipients, vec!["admin-1", "operator-1"]);
    assert!(rows.iter().all(|r| r.context_id == Some(alert.id.to_string())));
}

// ===== ENGINE =====

fn engine(h: &common::Harness, steps: Vec<Step>) -> HealthCheckEngine {
    let probe: Arc<dyn HealthProbe> = ScriptedProbe::new(STORAGE_CONNECTIVITY, steps);
    HealthCheckEngine::new(
        vec![probe],
        ThresholdSet::default(),
        h.dispatcher.clone(),
        h.store.clone(),
        Duration::from_secs(10),
    )
}

#[tokio::test(start_paused = true)]
async fn stalled_metric_writes_do_not_hold_the_cycle() {
    let h = harness().await;
    let store = Arc::new(common::StalledMetricsStore { inner: h.store.clone() });
    let probe: Arc<dyn HealthProbe> = ScriptedProbe::new(STORAGE_CONNECTIVITY, vec![Step::Value(10.0)]);
    let engine = HealthCheckEngine::new(
        vec![probe],
        ThresholdSet::default(),
        h.dispatcher.clone(),
        store,
        Duration::from_secs(10),
    );

    let results = tokio::time::timeout(Duration::from_secs(60), engine.run_cycle())
        .await
        .expect("cycle should finish once metric writes time out");

    assert_eq!(results[0].status, HealthStatus::Healthy);
    assert_eq!(h.store.health_results().await.len(), 1);
    assert!(h.store.metrics().await.is_empty());
}

#[tokio::test]
async fn improvement_clears_cooldown_so_next_regression_alerts() {
    let h = harness().await;
    let engine = engine(&h, vec![Step::Value(6000.0), Step::Value(10.0), Step::Value(6000.0)]);

    engine.run_cycle().await;
    engine.run_cycle().await;
    let results = engine.run_cycle().await;

    assert_eq!(results[0].status, HealthStatus::Critical);
    assert_eq!(h.store.alerts().await.len(), 2);
}

#[tokio::test]
async fn persistent_degradation_alerts_once() {
    let h = harness().await;
    let engine = engine(&h, vec![Step::Value(6000.0), Step::Value(7000.0), Step::Value(6500.0)]);

    for _ in 0..3 {
        engine.run_cycle().await;
    }

    assert_eq!(h.store.alerts().await.len(), 1);
    assert_eq!(h.store.health_results().await.len(), 3);
}

#[tokio::test]
async fn thresholds_are_exclusive_bounds() {
    let h = harness().await;
    let engine = engine(&h, vec![Step::Value(1000.0), Step::Value(1000.5), Step::Value(5000.0)]);

    let statuses: Vec<HealthStatus> = {
        let mut statuses = Vec::new();
        for _ in 0..3 {
            statuses.push(engine.run_cycle().await[0].status);
        }
        statuses
    };

    assert_eq!(
        statuses,
        vec![HealthStatus::Healthy, HealthStatus::Warning, HealthStatus::Warning]
    );
}

#[tokio::test]
async fn probe_error_is_critical_with_message() {
    let h = harness().await;
    let engine = engine(&h, vec![Step::Fail]);

    let results = engine.run_cycle().await;

    assert_eq!(results[0].status, HealthStatus::Critical);
    assert!(results[0].error.as_deref().unwrap_or_default().contains("connection refused"));
    assert_eq!(h.store.alerts().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_probe_times_out_as_unknown() {
    let h = harness().await;
    let engine = engine(&h, vec![Step::Hang]);

    let results = engine.run_cycle().await;

    assert_eq!(results[0].status, HealthStatus::Unknown);
    assert!(results[0].error.is_some());
    assert!(h.store.alerts().await.is_empty());
}

#[tokio::test]
async fn unavailable_signal_is_unknown_and_never_alerts() {
    let h = harness().await;
    let engine = engine(&h, vec![Step::NoSignal, Step::NoSignal]);

    engine.run_cycle().await;
    let results = engine.run_cycle().await;

    assert_eq!(results[0].status, HealthStatus::Unknown);
    assert!(results[0].error.as_deref().unwrap_or_default().contains("no source"));
    assert!(h.store.alerts().await.is_empty());
}

#[tokio::test]
async fn cycle_records_duration_and_signal_metrics() {
    let h = harness().await;
    let engine = engine(&h, vec![Step::Value(1500.0)]);

    engine.run_cycle().await;

    let names: Vec<String> = h.store.metrics().await.into_iter().map(|m| m.metric_name).collect();
    assert!(names.contains(&"storage_connectivity.duration_ms".to_string()));
    assert!(names.contains(&"storage_connectivity.ms".to_string()));

    let last = engine.last_results().await;
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].details["warning_threshold"], 1000.0);
}

// ===== DOMAIN SWEEPS =====

#[tokio::test]
async fn sweeps_alert_on_positive_counts_and_clear_on_zero() {
    let h = harness().await;
    let sweeper = DomainSweeper::new(h.store.clone(), h.dispatcher.clone());

    h.store
        .set_sweep_counts(SweepCounts {
            overdue_orders: 4,
            broken_machines: 0,
            low_stock_items: 2,
        })
        .await;
    assert_eq!(sweeper.run_sweeps().await, 2);
    assert_eq!(sweeper.run_sweeps().await, 0);

    h.store
        .set_sweep_counts(SweepCounts {
            overdue_orders: 0,
            broken_machines: 0,
            low_stock_items: 2,
        })
        .await;
    assert_eq!(sweeper.run_sweeps().await, 0);

    h.store
        .set_sweep_counts(SweepCounts {
            overdue_orders: 1,
            broken_machines: 0,
            low_stock_items: 2,
        })
        .await;
    assert_eq!(sweeper.run_sweeps().await, 1);

    let overdue = h
        .store
        .alerts()
        .await
        .into_iter()
        .filter(|a| a.source_id == "overdue_orders")
        .count();
    assert_eq!(overdue, 2);

    // production_manager members receive overdue-order alerts
    let operator_rows = h
        .store
        .notifications()
        .await
        .into_iter()
        .filter(|n| n.user_id == "operator-1")
        .count();
    assert_eq!(operator_rows, 2);
}

#[tokio::test]
async fn failed_sweep_query_is_skipped() {
    let h = harness().await;
    let sweeper = DomainSweeper::new(h.store.clone(), h.dispatcher.clone());
    h.store
        .set_sweep_counts(SweepCounts {
            overdue_orders: 4,
            ..Default::default()
        })
        .await;
    h.store.set_storage_failing(true);

    assert_eq!(sweeper.run_sweeps().await, 0);
    assert_eq!(h.dispatcher.cooldown_count().await, 0);

    h.store.set_storage_failing(false);
    assert_eq!(sweeper.run_sweeps().await, 1);
}

#[tokio::test]
async fn slow_storage_degrades_performance_probe() {
    let h = harness().await;
    h.store.set_latency(Duration::from_millis(600)).await;
    let engine = HealthCheckEngine::new(
        monitoring_cell::services::probes::default_probes(h.store.clone()),
        ThresholdSet::default(),
        h.dispatcher.clone(),
        h.store.clone(),
        Duration::from_secs(10),
    );

    let results = engine.run_probes().await;
    let performance = results
        .iter()
        .find(|r| r.check_name == "storage_performance")
        .unwrap();
    let connectivity = results
        .iter()
        .find(|r| r.check_name == STORAGE_CONNECTIVITY)
        .unwrap();

    assert_eq!(performance.status, HealthStatus::Warning);
    assert_eq!(connectivity.status, HealthStatus::Healthy);
    assert!(performance.details.contains_key("active_connections"));
}
