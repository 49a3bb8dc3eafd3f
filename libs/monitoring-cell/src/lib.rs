// =====================================================================================
// MONITORING CELL - HEALTH CHECKS, ALERTING & REAL-TIME NOTIFICATIONS
// =====================================================================================
//
// This cell provides:
// - Periodic health probes classified against per-probe thresholds
// - Cooldown-limited alert dispatch with suggested remediation
// - Domain sweeps and retention of persisted metrics
// - A server-sent events hub with heartbeat, stale eviction and unread backfill
//
// =====================================================================================

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;
pub mod supabase_store;
pub mod thresholds;

pub use error::MonitoringError;
pub use models::{HealthCheckResult, HealthStatus, OutgoingNotification, PushEvent, SystemAlert};
pub use services::{AlertDispatcher, HealthCheckEngine, MonitoringCoordinator, NotificationHub};
pub use store::{InMemoryStore, MonitoringStore, SweepSource, UserDirectory};
pub use supabase_store::SupabaseMonitoringStore;

pub use router::{create_monitoring_router, MonitoringState};
