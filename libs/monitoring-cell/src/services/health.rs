// =====================================================================================
// HEALTH CHECK ENGINE
// =====================================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::error::MonitoringError;
use crate::models::{Details, HealthCheckResult, HealthStatus, PerformanceMetric};
use crate::services::alerts::AlertDispatcher;
use crate::services::probes::{HealthProbe, ProbeReading};
use crate::store::MonitoringStore;
use crate::thresholds::ThresholdSet;

pub struct HealthCheckEngine {
    probes: Vec<Arc<dyn HealthProbe>>,
    thresholds: ThresholdSet,
    previous: RwLock<HashMap<String, HealthCheckResult>>,
    dispatcher: Arc<AlertDispatcher>,
    store: Arc<dyn MonitoringStore>,
    probe_timeout: Duration,
    cycle: Mutex<()>,
}

impl HealthCheckEngine {
    pub fn new(
        probes: Vec<Arc<dyn HealthProbe>>,
        thresholds: ThresholdSet,
        dispatcher: Arc<AlertDispatcher>,
        store: Arc<dyn MonitoringStore>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            probes,
            thresholds,
            previous: RwLock::new(HashMap::new()),
            dispatcher,
            store,
            probe_timeout,
            cycle: Mutex::new(()),
        }
    }

    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }

    /// Runs every probe concurrently, each bounded by the probe timeout.
    pub async fn run_probes(&self) -> Vec<HealthCheckResult> {
        join_all(self.probes.iter().map(|probe| self.run_probe(probe.as_ref()))).await
    }

    async fn run_probe(&self, probe: &dyn HealthProbe) -> HealthCheckResult {
        let start = Instant::now();
        let outcome = match timeout(self.probe_timeout, probe.probe()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(MonitoringError::Timeout(self.probe_timeout)),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        self.classify(probe, outcome, duration_ms)
    }

    fn classify(
        &self,
        probe: &dyn HealthProbe,
        outcome: Result<ProbeReading, MonitoringError>,
        duration_ms: u64,
    ) -> HealthCheckResult {
        let (status, details, error) = match outcome {
            Ok(reading) => {
                let status = reading
                    .signal
                    .map(|value| self.thresholds.classify(probe.name(), value))
                    .unwrap_or(HealthStatus::Healthy);
                let mut details = reading.details;
                if let (Some(value), Some(threshold)) = (reading.signal, self.thresholds.get(probe.name())) {
                    details.insert("value".to_string(), value.into());
                    details.insert("warning_threshold".to_string(), threshold.warning.into());
                    details.insert("critical_threshold".to_string(), threshold.critical.into());
                    details.insert("unit".to_string(), threshold.unit.clone().into());
                }
                (status, details, None)
            }
            // No signal observed: the state of the subsystem is not known.
            Err(e @ (MonitoringError::Timeout(_) | MonitoringError::Unavailable(_))) => {
                (HealthStatus::Unknown, Details::new(), Some(e.to_string()))
            }
            Err(e) => (HealthStatus::Critical, Details::new(), Some(e.to_string())),
        };

        if let Some(error) = &error {
            warn!(check = probe.name(), status = %status, error = %error, "Health probe failed");
        }

        HealthCheckResult {
            check_name: probe.name().to_string(),
            check_name_localized: probe.display_name().to_string(),
            status,
            duration_ms,
            details,
            error,
            checked_at: Utc::now(),
        }
    }

    /// One scheduled cycle: probe, detect transitions, persist, alert, remember.
    /// Cycles never overlap.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Vec<HealthCheckResult> {
        let _cycle = self.cycle.lock().await;
        let results = self.run_probes().await;

        for result in &results {
            let previous_status = self
                .previous
                .read()
                .await
                .get(&result.check_name)
                .map(|previous| previous.status);

            if let Some(previous_status) = previous_status {
                if previous_status != result.status {
                    info!(
                        check = %result.check_name,
                        from = %previous_status,
                        to = %result.status,
                        "Health status changed"
                    );
                }
                if result.status.improved_from(previous_status) {
                    self.dispatcher.clear_cooldowns(&result.check_name).await;
                }
            }

            self.persist(result).await;

            if result.status.is_alertable() {
                self.dispatcher.maybe_alert(result).await;
            }

            self.previous
                .write()
                .await
                .insert(result.check_name.clone(), result.clone());
        }

        debug!(
            checks = results.len(),
            degraded = results.iter().filter(|r| r.status != HealthStatus::Healthy).count(),
            "Health cycle complete"
        );
        results
    }

    async fn persist(&self, result: &HealthCheckResult) {
        match timeout(self.probe_timeout, self.store.insert_health_check_result(result)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(check = %result.check_name, error = %e, "Failed to persist health result"),
            Err(_) => warn!(check = %result.check_name, "Timed out persisting health result"),
        }

        for metric in self.metrics_for(result) {
            match timeout(self.probe_timeout, self.store.insert_performance_metric(&metric)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(metric = %metric.metric_name, error = %e, "Failed to persist performance metric"),
                Err(_) => debug!(metric = %metric.metric_name, "Timed out persisting performance metric"),
            }
        }
    }

    fn metrics_for(&self, result: &HealthCheckResult) -> Vec<PerformanceMetric> {
        let mut metrics = vec![PerformanceMetric {
            metric_name: format!("{}.duration_ms", result.check_name),
            metric_value: result.duration_ms as f64,
            unit: "ms".to_string(),
            source: result.check_name.clone(),
            recorded_at: result.checked_at,
        }];

        let signal = result.details.get("value").and_then(|v| v.as_f64());
        if let (Some(value), Some(threshold)) = (signal, self.thresholds.get(&result.check_name)) {
            metrics.push(PerformanceMetric {
                metric_name: format!("{}.{}", result.check_name, threshold.unit),
                metric_value: value,
                unit: threshold.unit.clone(),
                source: result.check_name.clone(),
                recorded_at: result.checked_at,
            });
        }
        metrics
    }

    /// Latest result per probe, in probe order.
    pub async fn last_results(&self) -> Vec<HealthCheckResult> {
        let previous = self.previous.read().await;
        self.probes
            .iter()
            .filter_map(|probe| previous.get(probe.name()).cloned())
            .collect()
    }
}
