pub mod alerts;
pub mod coordinator;
pub mod health;
pub mod notifications;
pub mod probes;
pub mod sweeps;

pub use alerts::{AlertDispatcher, CooldownPolicy};
pub use coordinator::{MonitoringCoordinator, Schedule};
pub use health::HealthCheckEngine;
pub use notifications::{ChannelTransport, Delivery, HubSettings, NotificationHub, PushTransport};
pub use probes::HealthProbe;
pub use sweeps::DomainSweeper;
