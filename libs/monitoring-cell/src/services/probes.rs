// =====================================================================================
// HEALTH PROBES
// =====================================================================================

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::MonitoringError;
use crate::models::Details;
use crate::store::MonitoringStore;
use crate::thresholds::{PROCESS_MEMORY, PROCESS_UPTIME, STORAGE_CONNECTIVITY, STORAGE_PERFORMANCE};

/// What a probe observed. `signal` is the value compared against the probe's
/// thresholds; probes without a signal are classified healthy.
#[derive(Debug, Clone, Default)]
pub struct ProbeReading {
    pub signal: Option<f64>,
    pub details: Details,
}

impl ProbeReading {
    pub fn with_signal(signal: f64) -> Self {
        Self {
            signal: Some(signal),
            details: Details::new(),
        }
    }

    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Stable identifier, also the threshold and cooldown key prefix.
    fn name(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    async fn probe(&self) -> Result<ProbeReading, MonitoringError>;
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

pub struct StorageConnectivityProbe {
    store: Arc<dyn MonitoringStore>,
}

impl StorageConnectivityProbe {
    pub fn new(store: Arc<dyn MonitoringStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthProbe for StorageConnectivityProbe {
    fn name(&self) -> &'static str {
        STORAGE_CONNECTIVITY
    }

    fn display_name(&self) -> &'static str {
        "Storage connectivity"
    }

    async fn probe(&self) -> Result<ProbeReading, MonitoringError> {
        let start = Instant::now();
        self.store.ping().await?;
        let round_trip = elapsed_ms(start);

        Ok(ProbeReading::with_signal(round_trip).detail("round_trip_ms", round_trip.round()))
    }
}

pub struct StoragePerformanceProbe {
    store: Arc<dyn MonitoringStore>,
}

impl StoragePerformanceProbe {
    pub fn new(store: Arc<dyn MonitoringStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthProbe for StoragePerformanceProbe {
    fn name(&self) -> &'static str {
        STORAGE_PERFORMANCE
    }

    fn display_name(&self) -> &'static str {
        "Storage performance"
    }

    async fn probe(&self) -> Result<ProbeReading, MonitoringError> {
        let start = Instant::now();
        let stats = self.store.storage_stats().await?;
        let round_trip = elapsed_ms(start);

        Ok(ProbeReading::with_signal(round_trip)
            .detail("round_trip_ms", round_trip.round())
            .detail("active_connections", stats.active_connections)
            .detail("database_size_bytes", stats.database_size_bytes)
            .detail(
                "database_size_mb",
                (stats.database_size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            ))
    }
}

// =====================================================================================
// PROCESS MEMORY
// =====================================================================================

/// Byte counts describing the process heap and resident set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    pub heap_used: u64,
    pub heap_total: u64,
    pub rss: u64,
}

impl MemorySample {
    /// Conservative usage figure: the larger of the heap ratio and the resident set
    /// measured against twice the heap size. Returns `None` when the heap size is
    /// unknown.
    pub fn effective_usage_percent(&self) -> Option<f64> {
        if self.heap_total == 0 {
            return None;
        }
        let heap_ratio = self.heap_used as f64 / self.heap_total as f64;
        let rss_ratio = self.rss as f64 / (self.heap_total as f64 * 2.0);
        Some(heap_ratio.max(rss_ratio) * 100.0)
    }
}

pub trait MemorySampler: Send + Sync {
    fn sample(&self) -> Result<MemorySample, MonitoringError>;
}

/// Reads `/proc/self/status`. The heap is approximated by the data segment
/// (`VmData`) and its resident anonymous part (`RssAnon`).
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcStatusSampler;

impl ProcStatusSampler {
    pub fn parse(status: &str) -> Result<MemorySample, MonitoringError> {
        let field = |name: &str| -> Result<u64, MonitoringError> {
            status
                .lines()
                .find_map(|line| line.strip_prefix(name))
                .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
                .and_then(|kb| kb.parse::<u64>().ok())
                .map(|kb| kb * 1024)
                .ok_or_else(|| MonitoringError::ProbeFailed(format!("{} missing from process status", name)))
        };

        Ok(MemorySample {
            heap_used: field("RssAnon")?,
            heap_total: field("VmData")?,
            rss: field("VmRSS")?,
        })
    }
}

impl ProcStatusSampler {
    /// A missing status file means the platform has no `/proc`, not a failing process.
    pub fn read(path: &Path) -> Result<MemorySample, MonitoringError> {
        let status = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                MonitoringError::Unavailable(format!("{} does not exist", path.display()))
            }
            _ => MonitoringError::ProbeFailed(format!("cannot read process status: {}", e)),
        })?;
        Self::parse(&status)
    }
}

impl MemorySampler for ProcStatusSampler {
    fn sample(&self) -> Result<MemorySample, MonitoringError> {
        Self::read(Path::new("/proc/self/status"))
    }
}

pub struct ProcessMemoryProbe {
    sampler: Arc<dyn MemorySampler>,
}

impl ProcessMemoryProbe {
    pub fn new(sampler: Arc<dyn MemorySampler>) -> Self {
        Self { sampler }
    }
}

#[async_trait]
impl HealthProbe for ProcessMemoryProbe {
    fn name(&self) -> &'static str {
        PROCESS_MEMORY
    }

    fn display_name(&self) -> &'static str {
        "Process memory"
    }

    async fn probe(&self) -> Result<ProbeReading, MonitoringError> {
        let sample = self.sampler.sample()?;
        let usage = sample
            .effective_usage_percent()
            .ok_or_else(|| MonitoringError::ProbeFailed("heap size reported as zero".to_string()))?;
        debug!(usage_percent = usage, "Sampled process memory");

        let mb = |bytes: u64| (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;
        Ok(ProbeReading::with_signal(usage)
            .detail("usage_percent", (usage * 100.0).round() / 100.0)
            .detail("heap_used_mb", mb(sample.heap_used))
            .detail("heap_total_mb", mb(sample.heap_total))
            .detail("rss_mb", mb(sample.rss)))
    }
}

// =====================================================================================
// PROCESS UPTIME
// =====================================================================================

/// Always healthy; proves the monitoring loop itself is running.
pub struct ProcessUptimeProbe {
    started_at: Instant,
}

impl ProcessUptimeProbe {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }
}

impl Default for ProcessUptimeProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for ProcessUptimeProbe {
    fn name(&self) -> &'static str {
        PROCESS_UPTIME
    }

    fn display_name(&self) -> &'static str {
        "Process uptime"
    }

    async fn probe(&self) -> Result<ProbeReading, MonitoringError> {
        Ok(ProbeReading::default()
            .detail("uptime_seconds", self.started_at.elapsed().as_secs())
            .detail("version", env!("CARGO_PKG_VERSION"))
            .detail("platform", json!({
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
            }))
            .detail("pid", std::process::id()))
    }
}

/// The built-in probe set.
pub fn default_probes(store: Arc<dyn MonitoringStore>) -> Vec<Arc<dyn HealthProbe>> {
    vec![
        Arc::new(StorageConnectivityProbe::new(store.clone())),
        Arc::new(StoragePerformanceProbe::new(store)),
        Arc::new(ProcessMemoryProbe::new(Arc::new(ProcStatusSampler))),
        Arc::new(ProcessUptimeProbe::new()),
    ]
}
