// =====================================================================================
// PROBE THRESHOLDS
// =====================================================================================

use std::collections::HashMap;

use serde::Serialize;

use crate::models::HealthStatus;

pub const STORAGE_CONNECTIVITY: &str = "storage_connectivity";
pub const STORAGE_PERFORMANCE: &str = "storage_performance";
pub const PROCESS_MEMORY: &str = "process_memory";
pub const PROCESS_UPTIME: &str = "process_uptime";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Threshold {
    pub warning: f64,
    pub critical: f64,
    pub unit: String,
}

impl Threshold {
    pub fn new(warning: f64, critical: f64, unit: &str) -> Self {
        Self {
            warning,
            critical,
            unit: unit.to_string(),
        }
    }

    /// Bounds are exclusive: a value equal to a bound stays in the lower band.
    pub fn classify(&self, value: f64) -> HealthStatus {
        if value > self.critical {
            HealthStatus::Critical
        } else if value > self.warning {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThresholdSet {
    thresholds: HashMap<String, Threshold>,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        let mut thresholds = HashMap::new();
        thresholds.insert(STORAGE_CONNECTIVITY.to_string(), Threshold::new(1000.0, 5000.0, "ms"));
        thresholds.insert(STORAGE_PERFORMANCE.to_string(), Threshold::new(500.0, 2000.0, "ms"));
        thresholds.insert(PROCESS_MEMORY.to_string(), Threshold::new(85.0, 95.0, "percent"));
        Self { thresholds }
    }
}

impl ThresholdSet {
    /// Reference thresholds with `(warning, critical)` overrides applied. Overrides keep
    /// the unit of the probe they replace.
    pub fn with_overrides(overrides: &HashMap<String, (f64, f64)>) -> Self {
        let mut set = Self::default();
        for (name, (warning, critical)) in overrides {
            let unit = set
                .thresholds
                .get(name)
                .map(|t| t.unit.clone())
                .unwrap_or_default();
            set.thresholds.insert(name.clone(), Threshold::new(*warning, *critical, &unit));
        }
        set
    }

    pub fn get(&self, check_name: &str) -> Option<&Threshold> {
        self.thresholds.get(check_name)
    }

    /// Probes without a configured threshold are healthy whenever they produce a signal.
    pub fn classify(&self, check_name: &str, value: f64) -> HealthStatus {
        self.get(check_name)
            .map(|t| t.classify(value))
            .unwrap_or(HealthStatus::Healthy)
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}
