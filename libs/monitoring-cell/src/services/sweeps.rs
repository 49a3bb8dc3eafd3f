// =====================================================================================
// DOMAIN SWEEPS
// =====================================================================================

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::MonitoringError;
use crate::models::{
    ActionPriority, AlertCategory, AlertSeverity, AlertType, Details, SuggestedAction, SystemAlert,
};
use crate::services::alerts::AlertDispatcher;
use crate::store::SweepSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    OverdueOrders,
    BrokenMachines,
    LowStock,
}

impl SweepKind {
    pub const ALL: [SweepKind; 3] = [SweepKind::OverdueOrders, SweepKind::BrokenMachines, SweepKind::LowStock];

    /// Cooldown key and alert source id.
    pub fn key(self) -> &'static str {
        match self {
            SweepKind::OverdueOrders => "overdue_orders",
            SweepKind::BrokenMachines => "broken_machines",
            SweepKind::LowStock => "low_stock",
        }
    }

    fn alert_type(self) -> AlertType {
        match self {
            SweepKind::OverdueOrders => AlertType::Production,
            SweepKind::BrokenMachines => AlertType::Maintenance,
            SweepKind::LowStock => AlertType::Inventory,
        }
    }

    fn grade(self) -> (AlertCategory, AlertSeverity) {
        match self {
            SweepKind::BrokenMachines => (AlertCategory::Error, AlertSeverity::High),
            _ => (AlertCategory::Warning, AlertSeverity::Medium),
        }
    }

    fn target_roles(self) -> Vec<String> {
        let owner = match self {
            SweepKind::OverdueOrders => "production_manager",
            SweepKind::BrokenMachines => "maintenance",
            SweepKind::LowStock => "inventory_manager",
        };
        vec![owner.to_string(), "admin".to_string()]
    }

    fn describe(self, count: u64) -> (String, String) {
        match self {
            SweepKind::OverdueOrders => (
                "Overdue production orders".to_string(),
                format!("{} production orders are past their due date", count),
            ),
            SweepKind::BrokenMachines => (
                "Machines out of service".to_string(),
                format!("{} machines are reported broken", count),
            ),
            SweepKind::LowStock => (
                "Low stock".to_string(),
                format!("{} inventory items are at or below their minimum level", count),
            ),
        }
    }

    fn suggested_action(self) -> SuggestedAction {
        match self {
            SweepKind::OverdueOrders => SuggestedAction::new(
                "review_overdue_orders",
                ActionPriority::Medium,
                "Review overdue orders and reschedule production",
            ),
            SweepKind::BrokenMachines => SuggestedAction::new(
                "schedule_maintenance",
                ActionPriority::High,
                "Schedule maintenance for the affected machines",
            ),
            SweepKind::LowStock => SuggestedAction::new(
                "reorder_stock",
                ActionPriority::Medium,
                "Reorder the items below their minimum level",
            ),
        }
    }

    pub fn alert(self, count: u64) -> SystemAlert {
        let (category, severity) = self.grade();
        let (title, message) = self.describe(count);
        let mut context_data = Details::new();
        context_data.insert("count".to_string(), Value::from(count));

        SystemAlert {
            id: Uuid::new_v4(),
            title,
            title_localized: None,
            message,
            message_localized: None,
            alert_type: self.alert_type(),
            category,
            severity,
            source: "domain_sweep".to_string(),
            source_id: self.key().to_string(),
            context_data,
            suggested_actions: vec![self.suggested_action()],
            target_users: Vec::new(),
            target_roles: self.target_roles(),
            requires_action: severity == AlertSeverity::Critical,
            created_at: Utc::now(),
        }
    }
}

pub struct DomainSweeper {
    source: Arc<dyn SweepSource>,
    dispatcher: Arc<AlertDispatcher>,
}

impl DomainSweeper {
    pub fn new(source: Arc<dyn SweepSource>, dispatcher: Arc<AlertDispatcher>) -> Self {
        Self { source, dispatcher }
    }

    pub fn rule_count(&self) -> usize {
        SweepKind::ALL.len()
    }

    async fn count(&self, kind: SweepKind) -> Result<u64, MonitoringError> {
        match kind {
            SweepKind::OverdueOrders => self.source.count_overdue_orders().await,
            SweepKind::BrokenMachines => self.source.count_broken_machines().await,
            SweepKind::LowStock => self.source.count_low_stock_items().await,
        }
    }

    /// Runs every sweep once. Returns the number of alerts emitted.
    #[instrument(skip(self))]
    pub async fn run_sweeps(&self) -> usize {
        let mut emitted = 0;
        for kind in SweepKind::ALL {
            match self.count(kind).await {
                Ok(0) => {
                    self.dispatcher.clear_cooldowns(kind.key()).await;
                }
                Ok(count) => {
                    debug!(sweep = kind.key(), count, "Sweep found matching rows");
                    if self.dispatcher.dispatch(kind.key(), kind.alert(count)).await {
                        emitted += 1;
                    }
                }
                Err(e) => warn!(sweep = kind.key(), error = %e, "Domain sweep failed"),
            }
        }
        emitted
    }
}
