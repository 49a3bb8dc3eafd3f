// =====================================================================================
// MONITORING COORDINATOR
// =====================================================================================

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, warn};

use shared_config::MonitoringConfig;

use crate::models::SystemStatus;
use crate::services::alerts::AlertDispatcher;
use crate::services::health::HealthCheckEngine;
use crate::services::notifications::{HubSettings, NotificationHub};
use crate::services::probes::default_probes;
use crate::services::sweeps::DomainSweeper;
use crate::store::{MonitoringStore, SweepSource, UserDirectory};
use crate::thresholds::ThresholdSet;

/// Cadences and horizons for the three background loops.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub health_check_interval: Duration,
    pub sweep_interval: Duration,
    pub retention_interval: Duration,
    pub metric_retention: chrono::Duration,
    pub cooldown_retention: Duration,
    /// Upper bound on each store call made by the retention sweep.
    pub store_timeout: Duration,
}

impl From<&MonitoringConfig> for Schedule {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            health_check_interval: config.health_check_interval,
            sweep_interval: config.sweep_interval,
            retention_interval: config.retention_interval,
            metric_retention: chrono::Duration::days(config.metric_retention_days),
            cooldown_retention: config.cooldown_retention,
            store_timeout: config.probe_timeout,
        }
    }
}

/// Owns the health, sweep and retention loops and the notification hub they feed.
pub struct MonitoringCoordinator {
    engine: Arc<HealthCheckEngine>,
    sweeper: Arc<DomainSweeper>,
    dispatcher: Arc<AlertDispatcher>,
    hub: Arc<NotificationHub>,
    store: Arc<dyn MonitoringStore>,
    schedule: Schedule,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    active: AtomicBool,
}

impl MonitoringCoordinator {
    /// Starts all three loops. Health checks and sweeps run immediately, retention
    /// after its first interval.
    pub fn start(
        engine: Arc<HealthCheckEngine>,
        sweeper: Arc<DomainSweeper>,
        dispatcher: Arc<AlertDispatcher>,
        hub: Arc<NotificationHub>,
        store: Arc<dyn MonitoringStore>,
        schedule: Schedule,
    ) -> Arc<Self> {
        let coordinator = Arc::new(Self {
            engine,
            sweeper,
            dispatcher,
            hub,
            store,
            schedule,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            active: AtomicBool::new(true),
        });

        let engine = coordinator.engine.clone();
        coordinator.spawn_loop("health_checks", coordinator.schedule.health_check_interval, true, move || {
            let engine = engine.clone();
            async move {
                engine.run_cycle().await;
            }
        });

        let sweeper = coordinator.sweeper.clone();
        coordinator.spawn_loop("domain_sweeps", coordinator.schedule.sweep_interval, true, move || {
            let sweeper = sweeper.clone();
            async move {
                sweeper.run_sweeps().await;
            }
        });

        let weak = Arc::downgrade(&coordinator);
        coordinator.spawn_loop("retention", coordinator.schedule.retention_interval, false, move || {
            let weak = weak.clone();
            async move {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.run_retention().await;
                }
            }
        });

        info!(
            health_interval_secs = coordinator.schedule.health_check_interval.as_secs(),
            sweep_interval_secs = coordinator.schedule.sweep_interval.as_secs(),
            "Monitoring started"
        );
        coordinator
    }

    /// Builds the full engine from configuration and starts it.
    pub fn start_with_defaults(
        config: &MonitoringConfig,
        store: Arc<dyn MonitoringStore>,
        directory: Arc<dyn UserDirectory>,
        sweep_source: Arc<dyn SweepSource>,
    ) -> Arc<Self> {
        let hub = NotificationHub::new(store.clone(), directory, HubSettings::from(config));
        hub.start();

        let dispatcher = Arc::new(AlertDispatcher::from_config(config, store.clone(), hub.clone()));
        let thresholds = ThresholdSet::with_overrides(&config.threshold_overrides);
        let engine = Arc::new(HealthCheckEngine::new(
            default_probes(store.clone()),
            thresholds,
            dispatcher.clone(),
            store.clone(),
            config.probe_timeout,
        ));
        let sweeper = Arc::new(DomainSweeper::new(sweep_source, dispatcher.clone()));

        Self::start(engine, sweeper, dispatcher, hub, store, Schedule::from(config))
    }

    /// Each tick runs in its own task so a panic ends that tick, not the loop.
    /// Cancellation abandons the in-flight tick.
    fn spawn_loop<F, Fut>(&self, name: &'static str, period: Duration, immediate: bool, job: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        self.tasks.spawn(async move {
            let start = if immediate { Instant::now() } else { Instant::now() + period };
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let mut handle = tokio::spawn(job());
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        handle.abort();
                        break;
                    }
                    outcome = &mut handle => {
                        if let Err(e) = outcome {
                            if e.is_panic() {
                                error!(task = name, "Monitoring task panicked, continuing on next tick");
                            }
                        }
                    }
                }
            }
            info!(task = name, "Monitoring loop stopped");
        });
    }

    /// Prunes old performance metrics and stale cooldown entries.
    #[instrument(skip(self))]
    pub async fn run_retention(&self) {
        let cutoff = Utc::now() - self.schedule.metric_retention;
        match timeout(
            self.schedule.store_timeout,
            self.store.delete_old_performance_metrics(cutoff),
        )
        .await
        {
            Ok(Ok(deleted)) => info!(deleted, cutoff = %cutoff, "Pruned old performance metrics"),
            Ok(Err(e)) => warn!(error = %e, "Failed to prune performance metrics"),
            Err(_) => warn!(cutoff = %cutoff, "Timed out pruning performance metrics"),
        }

        let pruned = self.dispatcher.prune_cooldowns(self.schedule.cooldown_retention).await;
        if pruned > 0 {
            info!(pruned, "Pruned expired alert cooldowns");
        }
    }

    /// Stops the loops and waits for them to exit. Safe to call repeatedly.
    pub async fn stop_monitoring(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!("Stopping monitoring loops");
        }
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Stops the loops, then closes every push connection.
    pub async fn shutdown(&self) {
        self.stop_monitoring().await;
        self.hub.shutdown().await;
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn get_system_status(&self) -> SystemStatus {
        let active = self.is_active();
        SystemStatus {
            monitoring_active: active,
            health_checks_active: active && self.engine.probe_count() > 0,
            last_results: self.engine.last_results().await,
            rule_count: self.engine.thresholds().len() + self.sweeper.rule_count(),
        }
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub fn engine(&self) -> &Arc<HealthCheckEngine> {
        &self.engine
    }
}
