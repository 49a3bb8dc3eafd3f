// =====================================================================================
// NOTIFICATION HUB - LIVE PUSH CONNECTIONS
// =====================================================================================

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use shared_config::MonitoringConfig;
use shared_models::auth::User;

use crate::error::MonitoringError;
use crate::models::{
    ConnectionStats, NotificationPayload, OutgoingNotification, PushEvent, RecipientType,
    SystemNotification,
};
use crate::store::{MonitoringStore, UserDirectory};

/// Write side of one client's push stream.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Writes one event. Must not block.
    fn send(&self, event: &PushEvent) -> Result<(), MonitoringError>;
    /// Closes the stream. Repeated calls are no-ops.
    fn close(&self);
    fn is_closed(&self) -> bool;
    /// Resolves once the stream is closed from either side.
    async fn closed(&self);
}

/// Transport backed by a bounded channel; the receiving half is turned into the SSE
/// response body. A full buffer counts as a failed write.
pub struct ChannelTransport {
    sender: mpsc::Sender<PushEvent>,
    closed: CancellationToken,
}

/// Receiving half handed to the HTTP layer.
pub struct PushReceiver {
    receiver: mpsc::Receiver<PushEvent>,
    closed: CancellationToken,
}

impl ChannelTransport {
    pub fn channel(capacity: usize) -> (Arc<ChannelTransport>, PushReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(2));
        let closed = CancellationToken::new();
        (
            Arc::new(ChannelTransport {
                sender,
                closed: closed.clone(),
            }),
            PushReceiver { receiver, closed },
        )
    }
}

impl PushReceiver {
    /// Events in write order; ends when the hub closes the transport.
    pub fn into_stream(self) -> impl Stream<Item = PushEvent> + Send + 'static {
        ReceiverStream::new(self.receiver).take_until(self.closed.cancelled_owned())
    }
}

#[async_trait]
impl PushTransport for ChannelTransport {
    fn send(&self, event: &PushEvent) -> Result<(), MonitoringError> {
        if self.closed.is_cancelled() {
            return Err(MonitoringError::Transport("stream closed".to_string()));
        }
        self.sender.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                MonitoringError::Transport("client is not draining its stream".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                MonitoringError::Transport("client disconnected".to_string())
            }
        })
    }

    fn close(&self) {
        self.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.sender.is_closed()
    }

    async fn closed(&self) {
        tokio::select! {
            _ = self.closed.cancelled() => {}
            _ = self.sender.closed() => {}
        }
    }
}

struct SseConnection {
    user_id: String,
    transport: Arc<dyn PushTransport>,
    last_heartbeat_at: Instant,
    /// Events held back until the unread backfill has been written.
    pending: Option<Vec<PushEvent>>,
}

impl SseConnection {
    /// A successful write counts as a heartbeat.
    fn write(&mut self, event: &PushEvent) -> Result<(), MonitoringError> {
        if let Some(queue) = self.pending.as_mut() {
            queue.push(event.clone());
            return Ok(());
        }
        self.transport.send(event)?;
        self.last_heartbeat_at = Instant::now();
        Ok(())
    }

    /// Writes the backfill, then everything queued while it was loading.
    fn finish_backfill(&mut self, backfill: Option<PushEvent>) -> Result<(), MonitoringError> {
        let queued = self.pending.take().unwrap_or_default();
        for event in backfill.iter().chain(queued.iter()) {
            self.write(event)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HubSettings {
    pub heartbeat_interval: Duration,
    pub stale_sweep_interval: Duration,
    pub stale_after: Duration,
    pub backfill_limit: usize,
    pub store_timeout: Duration,
}

impl From<&MonitoringConfig> for HubSettings {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval,
            stale_sweep_interval: config.stale_sweep_interval,
            stale_after: config.stale_after,
            backfill_limit: config.backfill_limit,
            store_timeout: config.probe_timeout,
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self::from(&MonitoringConfig::default())
    }
}

/// Outcome of addressing one user.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub notification: SystemNotification,
    pub persisted: bool,
    pub delivered_to: usize,
}

/// Registry of live push connections and fan-out of notifications to them.
pub struct NotificationHub {
    connections: RwLock<HashMap<String, SseConnection>>,
    store: Arc<dyn MonitoringStore>,
    directory: Arc<dyn UserDirectory>,
    settings: HubSettings,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl NotificationHub {
    pub fn new(
        store: Arc<dyn MonitoringStore>,
        directory: Arc<dyn UserDirectory>,
        settings: HubSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
            store,
            directory,
            settings,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// Starts the heartbeat and stale-connection timers.
    pub fn start(self: &Arc<Self>) {
        let hub = Arc::downgrade(self);
        spawn_ticker(
            &self.tasks,
            self.shutdown.clone(),
            self.settings.heartbeat_interval,
            hub.clone(),
            |hub| async move {
                hub.send_heartbeats().await;
            },
        );
        spawn_ticker(
            &self.tasks,
            self.shutdown.clone(),
            self.settings.stale_sweep_interval,
            hub,
            |hub| async move {
                hub.evict_stale_connections().await;
            },
        );
        info!(
            heartbeat_seconds = self.settings.heartbeat_interval.as_secs(),
            stale_after_seconds = self.settings.stale_after.as_secs(),
            "Notification hub timers started"
        );
    }

    /// Registers a connection, writes the handshake and the unread backfill. Live
    /// events for the connection are queued until the backfill is written; the
    /// registry lock is not held while unread rows are loaded.
    #[instrument(skip(self, transport))]
    pub async fn add_connection(
        self: &Arc<Self>,
        connection_id: String,
        user_id: String,
        transport: Arc<dyn PushTransport>,
    ) -> Result<(), MonitoringError> {
        if self.shutdown.is_cancelled() {
            transport.close();
            return Err(MonitoringError::ShuttingDown);
        }

        let handshake = PushEvent::Connected {
            connection_id: connection_id.clone(),
            user_id: user_id.clone(),
            server_time: chrono::Utc::now(),
        };
        if let Err(e) = transport.send(&handshake) {
            transport.close();
            return Err(e);
        }

        {
            let mut connections = self.connections.write().await;
            if let Some(previous) = connections.remove(&connection_id) {
                warn!(connection_id = %connection_id, "Replacing connection with duplicate id");
                previous.transport.close();
            }
            connections.insert(
                connection_id.clone(),
                SseConnection {
                    user_id: user_id.clone(),
                    transport: transport.clone(),
                    last_heartbeat_at: Instant::now(),
                    pending: Some(Vec::new()),
                },
            );
        }
        self.watch_transport(connection_id.clone(), transport.clone());

        let unread = match timeout(
            self.settings.store_timeout,
            self.store.get_unread_notifications(&user_id, self.settings.backfill_limit),
        )
        .await
        {
            Ok(Ok(unread)) => unread,
            Ok(Err(e)) => {
                warn!(user_id = %user_id, error = %e, "Failed to load unread notifications");
                Vec::new()
            }
            Err(_) => {
                warn!(user_id = %user_id, "Timed out loading unread notifications");
                Vec::new()
            }
        };

        let backfill = (!unread.is_empty()).then(|| {
            PushEvent::RecentNotifications(unread.iter().map(NotificationPayload::from).collect())
        });

        let mut connections = self.connections.write().await;
        let flushed = match connections.get_mut(&connection_id) {
            Some(connection) if same_transport(&connection.transport, &transport) => {
                connection.finish_backfill(backfill)
            }
            _ => Err(MonitoringError::Transport(
                "connection closed before backfill".to_string(),
            )),
        };
        if let Err(e) = flushed {
            let is_current = connections
                .get(&connection_id)
                .is_some_and(|c| same_transport(&c.transport, &transport));
            if is_current {
                connections.remove(&connection_id);
            }
            transport.close();
            return Err(e);
        }
        let total = connections.len();
        drop(connections);

        info!(
            connection_id = %connection_id,
            user_id = %user_id,
            backfilled = unread.len(),
            total_connections = total,
            "Push connection registered"
        );
        Ok(())
    }

    /// Removes the registry entry when the client side goes away.
    fn watch_transport(self: &Arc<Self>, connection_id: String, transport: Arc<dyn PushTransport>) {
        let hub: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                _ = transport.closed() => {}
                _ = shutdown.cancelled() => return,
            }
            if let Some(hub) = hub.upgrade() {
                hub.remove_if_current(&connection_id, &transport).await;
            }
        });
    }

    /// Removes `connection_id` only while it is still bound to `transport`, so a closed
    /// stream cannot evict a newer connection that reused its id.
    async fn remove_if_current(&self, connection_id: &str, transport: &Arc<dyn PushTransport>) {
        let mut connections = self.connections.write().await;
        let is_current = connections
            .get(connection_id)
            .is_some_and(|c| same_transport(&c.transport, transport));
        if is_current {
            if let Some(connection) = connections.remove(connection_id) {
                connection.transport.close();
                debug!(connection_id = %connection_id, "Push connection closed by client");
            }
        }
    }

    /// Closes and unregisters a connection. Unknown ids are ignored.
    pub async fn remove_connection(&self, connection_id: &str) -> bool {
        let removed = self.connections.write().await.remove(connection_id);
        match removed {
            Some(connection) => {
                connection.transport.close();
                debug!(connection_id = %connection_id, user_id = %connection.user_id, "Push connection removed");
                true
            }
            None => false,
        }
    }

    /// Persists one notification for `user_id` and pushes it to each of the user's
    /// open connections. Persistence and delivery failures are logged, not returned.
    pub async fn send_to_user(&self, user_id: &str, notification: &OutgoingNotification) -> Delivery {
        self.deliver(user_id, notification, RecipientType::User, Some(user_id.to_string()))
            .await
    }

    /// Resolves the role's members and addresses each one.
    #[instrument(skip(self, notification))]
    pub async fn send_to_role(
        &self,
        role_id: &str,
        notification: &OutgoingNotification,
    ) -> Result<Vec<Delivery>, MonitoringError> {
        let members = self
            .resolve(self.directory.get_users_by_role(role_id))
            .await?;

        let mut deliveries = Vec::with_capacity(members.len());
        for member in members {
            deliveries.push(
                self.deliver(&member.id, notification, RecipientType::Role, Some(role_id.to_string()))
                    .await,
            );
        }
        Ok(deliveries)
    }

    #[instrument(skip(self, notification))]
    pub async fn send_to_all(
        &self,
        notification: &OutgoingNotification,
    ) -> Result<Vec<Delivery>, MonitoringError> {
        let users = self.resolve(self.directory.get_active_users()).await?;

        let mut deliveries = Vec::with_capacity(users.len());
        for user in users {
            deliveries.push(self.deliver(&user.id, notification, RecipientType::All, None).await);
        }
        Ok(deliveries)
    }

    async fn resolve<F>(&self, lookup: F) -> Result<Vec<User>, MonitoringError>
    where
        F: std::future::Future<Output = Result<Vec<User>, MonitoringError>>,
    {
        timeout(self.settings.store_timeout, lookup)
            .await
            .map_err(|_| MonitoringError::Timeout(self.settings.store_timeout))?
    }

    async fn deliver(
        &self,
        user_id: &str,
        notification: &OutgoingNotification,
        recipient_type: RecipientType,
        recipient_id: Option<String>,
    ) -> Delivery {
        let row = SystemNotification::addressed(user_id, notification, recipient_type, recipient_id);

        let (row, persisted) = match timeout(
            self.settings.store_timeout,
            self.store.insert_system_notification(&row),
        )
        .await
        {
            Ok(Ok(stored)) => (stored, true),
            Ok(Err(e)) => {
                warn!(user_id = %user_id, error = %e, "Failed to persist notification, delivering live only");
                (row, false)
            }
            Err(_) => {
                warn!(user_id = %user_id, "Timed out persisting notification, delivering live only");
                (row, false)
            }
        };

        let event = PushEvent::Notification(NotificationPayload::from(&row));
        let delivered_to = self.push_to_user(user_id, &event).await;

        Delivery {
            notification: row,
            persisted,
            delivered_to,
        }
    }

    /// Writes to every connection of one user; failing connections are evicted.
    async fn push_to_user(&self, user_id: &str, event: &PushEvent) -> usize {
        let mut connections = self.connections.write().await;
        let mut delivered = 0;
        let mut failed = Vec::new();

        for (id, connection) in connections.iter_mut().filter(|(_, c)| c.user_id == user_id) {
            match connection.write(event) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(connection_id = %id, user_id = %user_id, error = %e, "Push write failed");
                    failed.push(id.clone());
                }
            }
        }

        evict(&mut connections, &failed);
        delivered
    }

    /// Writes a heartbeat to every connection and returns how many succeeded.
    pub async fn send_heartbeats(&self) -> usize {
        let event = PushEvent::Heartbeat {
            timestamp: chrono::Utc::now(),
        };
        let mut connections = self.connections.write().await;
        let mut failed = Vec::new();

        for (id, connection) in connections.iter_mut() {
            if let Err(e) = connection.write(&event) {
                debug!(connection_id = %id, error = %e, "Heartbeat write failed");
                failed.push(id.clone());
            }
        }

        evict(&mut connections, &failed);
        connections.len()
    }

    /// Evicts connections with no successful write within the staleness window.
    pub async fn evict_stale_connections(&self) -> Vec<String> {
        let stale_after = self.settings.stale_after;
        let now = Instant::now();

        let stale: Vec<String> = self
            .connections
            .read()
            .await
            .iter()
            .filter(|(_, c)| now.duration_since(c.last_heartbeat_at) > stale_after)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            if self.remove_connection(id).await {
                info!(connection_id = %id, "Evicted stale push connection");
            }
        }
        stale
    }

    pub async fn get_stats(&self) -> ConnectionStats {
        let connections = self.connections.read().await;
        let mut connections_by_user: HashMap<String, usize> = HashMap::new();
        for connection in connections.values() {
            *connections_by_user.entry(connection.user_id.clone()).or_insert(0) += 1;
        }

        ConnectionStats {
            active_connections: connections.len(),
            connections_by_user,
        }
    }

    /// Stops both timers and closes every connection. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();

        let drained: Vec<(String, SseConnection)> = self.connections.write().await.drain().collect();
        for (_, connection) in &drained {
            connection.transport.close();
        }

        self.tasks.wait().await;
        if !drained.is_empty() {
            info!(closed = drained.len(), "Notification hub shut down");
        }
    }
}

fn same_transport(a: &Arc<dyn PushTransport>, b: &Arc<dyn PushTransport>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn evict(connections: &mut HashMap<String, SseConnection>, ids: &[String]) {
    for id in ids {
        if let Some(connection) = connections.remove(id) {
            connection.transport.close();
        }
    }
}

/// Runs `tick` on a fixed period until `shutdown` fires or the owner is dropped.
/// The first run happens one period after start.
pub(crate) fn spawn_ticker<T, F, Fut>(
    tasks: &TaskTracker,
    shutdown: CancellationToken,
    period: Duration,
    owner: Weak<T>,
    tick: F,
) where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tasks.spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(target) = owner.upgrade() else { break };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick(target) => {}
            }
        }
    });
}
