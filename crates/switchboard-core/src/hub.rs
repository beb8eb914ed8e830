//! The hub: owner of all connections and sole writer of membership.
//!
//! Registration, unregistration and backplane-driven membership changes are
//! commands on one queue, handled one at a time by the control loop. Fanout
//! and membership checks read the registries concurrently.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use switchboard_protocol::{
    codec, group_topic, ClientEnvelope, ConnectionId, GroupMessage, GroupsBody,
    GROUP_TOPIC_PREFIX, USER_TOPIC_PREFIX,
};
use switchboard_transport::{FrameReader, FrameWriter};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::backplane::Backplane;
use crate::bridge::{self, BridgeKind};
use crate::connection::{Connection, Delivery, Outbox};
use crate::groups::{normalize_groups, GroupRegistry};
use crate::metrics;
use crate::pump;
use crate::resolver::MembershipResolver;
use crate::users::UserRegistry;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames buffered per connection before new ones are dropped.
    pub outbound_queue_capacity: usize,
    /// First delay before retrying a failed backplane subscription.
    pub retry_initial: Duration,
    /// Upper bound on the retry delay.
    pub retry_max: Duration,
    /// Close a connection that sends nothing for this long. `None` waits
    /// forever.
    pub read_timeout: Option<Duration>,
    /// Close a connection whose transport takes longer than this to accept
    /// one frame.
    pub write_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            retry_initial: Duration::from_millis(100),
            retry_max: Duration::from_secs(5),
            read_timeout: None,
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// A connection waiting for the control loop to resolve its groups.
pub(crate) struct Registration {
    connection: Arc<Connection>,
    outbox: Outbox,
    reader: Box<dyn FrameReader>,
    writer: Box<dyn FrameWriter>,
}

/// Commands consumed by the control loop.
pub(crate) enum Command {
    Register(Registration),
    Unregister(Arc<Connection>),
    GroupsChanged { user_id: String, groups: Vec<String> },
}

/// Central coordinator.
pub struct Hub {
    config: HubConfig,
    groups: GroupRegistry,
    users: UserRegistry,
    /// Registered connections, the owning references.
    connections: DashMap<ConnectionId, Arc<Connection>>,
    resolver: Arc<dyn MembershipResolver>,
    backplane: Arc<dyn Backplane>,
    commands: mpsc::UnboundedSender<Command>,
    /// Generation counters; bumped when a registry's topic set changes.
    group_topics_changed: watch::Sender<u64>,
    user_topics_changed: watch::Sender<u64>,
    shutdown: CancellationToken,
}

impl Hub {
    /// Create a hub and start its control loop and both backplane bridges.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        config: HubConfig,
        resolver: Arc<dyn MembershipResolver>,
        backplane: Arc<dyn Backplane>,
    ) -> Arc<Self> {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (group_topics_changed, _) = watch::channel(0);
        let (user_topics_changed, _) = watch::channel(0);

        info!(
            backplane = backplane.name(),
            "Starting hub with config: {:?}", config
        );

        let hub = Arc::new(Self {
            config,
            groups: GroupRegistry::new(),
            users: UserRegistry::new(),
            connections: DashMap::new(),
            resolver,
            backplane,
            commands,
            group_topics_changed,
            user_topics_changed,
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(Arc::clone(&hub).run(command_rx));
        tokio::spawn(bridge::run(Arc::clone(&hub), BridgeKind::Groups));
        tokio::spawn(bridge::run(Arc::clone(&hub), BridgeKind::Users));

        hub
    }

    /// Hand a new transport connection to the hub.
    ///
    /// The connection is pending until the control loop has resolved the
    /// user's groups; its pumps start only once it is registered. If
    /// resolution fails the transport is closed.
    pub fn connect<R, W>(&self, user_id: impl Into<String>, reader: R, writer: W) -> Arc<Connection>
    where
        R: FrameReader + 'static,
        W: FrameWriter + 'static,
    {
        let (connection, outbox) =
            Connection::new(user_id, self.config.outbound_queue_capacity);
        debug!(connection = %connection.id(), user = %connection.user_id(), "Connection pending");

        let registration = Registration {
            connection: Arc::clone(&connection),
            outbox,
            reader: Box::new(reader),
            writer: Box::new(writer),
        };
        if self.commands.send(Command::Register(registration)).is_err() {
            warn!(connection = %connection.id(), "Hub stopped, refusing connection");
            connection.close();
        }

        connection
    }

    /// Ask the control loop to tear a connection down.
    pub fn unregister(&self, connection: Arc<Connection>) {
        if self.commands.send(Command::Unregister(connection)).is_err() {
            trace!("Hub stopped, dropping unregister");
        }
    }

    /// Ask the control loop to apply a user's new group set to all of the
    /// user's local connections.
    pub fn notify_groups_changed(&self, user_id: impl Into<String>, groups: Vec<String>) {
        let command = Command::GroupsChanged {
            user_id: user_id.into(),
            groups,
        };
        if self.commands.send(command).is_err() {
            trace!("Hub stopped, dropping membership change");
        }
    }

    /// Deliver a message to every local member of its group except the
    /// connection it came from.
    ///
    /// Never waits on a connection. Returns the number of frames queued.
    pub fn distribute(&self, message: GroupMessage) -> usize {
        let sender = message.client_id.clone();
        let group_id = message.group_id.clone();

        let frame = match codec::encode(&ClientEnvelope::Message(message)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(group = %group_id, error = %e, "Failed to encode message");
                metrics::record_dropped("encode");
                return 0;
            }
        };

        let mut delivered = 0;
        for connection in self.groups.members_of(&group_id) {
            if connection.id() == &sender {
                continue;
            }
            if connection.deliver(frame.clone()) == Delivery::Queued {
                delivered += 1;
            }
        }

        trace!(group = %group_id, recipients = delivered, "Distributed message");
        metrics::record_delivered(delivered);
        delivered
    }

    /// Publish a message on its group's backplane topic.
    ///
    /// Every process subscribed to the group receives it, this one included;
    /// [`distribute`](Self::distribute) then skips the sender.
    pub async fn send_message(&self, message: GroupMessage) {
        let topic = group_topic(&message.group_id);
        let payload = match codec::encode(&message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to encode message");
                metrics::record_dropped("encode");
                return;
            }
        };

        match self.backplane.publish(&topic, payload).await {
            Ok(()) => {
                trace!(topic = %topic, "Published message");
                metrics::record_published();
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Publish failed");
                metrics::record_backplane_error("publish");
            }
        }
    }

    /// Snapshot of a group's local members.
    #[must_use]
    pub fn group_members(&self, group_id: &str) -> Vec<Arc<Connection>> {
        self.groups.members_of(group_id)
    }

    /// Snapshot of the group topics this process needs.
    #[must_use]
    pub fn group_topics(&self) -> Vec<String> {
        self.groups.topic_ids(GROUP_TOPIC_PREFIX)
    }

    /// Snapshot of a user's local connection IDs.
    #[must_use]
    pub fn user_connections(&self, user_id: &str) -> Vec<ConnectionId> {
        self.users.connections_of(user_id)
    }

    /// Snapshot of the user topics this process needs.
    #[must_use]
    pub fn user_topics(&self) -> Vec<String> {
        self.users.user_ids(USER_TOPIC_PREFIX)
    }

    /// Look up a registered connection.
    #[must_use]
    pub fn connection(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get the hub configuration.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Stop the control loop and both bridges, and close every connection,
    /// including ones still waiting to register.
    pub fn shutdown(&self) {
        info!("Shutting down hub");
        self.shutdown.cancel();
        for entry in self.connections.iter() {
            entry.value().close();
        }
    }

    pub(crate) fn backplane(&self) -> &dyn Backplane {
        self.backplane.as_ref()
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub(crate) fn topics(&self, kind: BridgeKind) -> Vec<String> {
        match kind {
            BridgeKind::Groups => self.group_topics(),
            BridgeKind::Users => self.user_topics(),
        }
    }

    pub(crate) fn topics_changed(&self, kind: BridgeKind) -> watch::Receiver<u64> {
        match kind {
            BridgeKind::Groups => self.group_topics_changed.subscribe(),
            BridgeKind::Users => self.user_topics_changed.subscribe(),
        }
    }

    fn resubscribe(&self, kind: BridgeKind) {
        let signal = match kind {
            BridgeKind::Groups => &self.group_topics_changed,
            BridgeKind::Users => &self.user_topics_changed,
        };
        signal.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    async fn run(self: Arc<Self>, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let command = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                Command::Register(registration) => self.register(registration).await,
                Command::Unregister(connection) => self.remove(&connection),
                Command::GroupsChanged { user_id, groups } => {
                    self.apply_groups_changed(&user_id, groups);
                }
            }
        }

        // Registrations still queued never reach the registries; close them
        // so their owners see the connection end.
        commands.close();
        while let Ok(command) = commands.try_recv() {
            if let Command::Register(registration) = command {
                self.abandon(registration.connection, registration.writer);
            }
        }

        debug!("Hub control loop stopped");
    }

    /// Close a connection that never got registered.
    fn abandon(&self, connection: Arc<Connection>, writer: Box<dyn FrameWriter>) {
        connection.close();
        tokio::spawn(pump::close_writer(
            connection,
            writer,
            self.config.write_timeout,
        ));
    }

    async fn register(self: &Arc<Self>, registration: Registration) {
        let Registration {
            connection,
            outbox,
            reader,
            writer,
        } = registration;

        let resolved = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            resolved = self.resolver.resolve(connection.user_id()) => Some(resolved),
        };
        let Some(resolved) = resolved else {
            debug!(connection = %connection.id(), "Hub stopped during registration");
            self.abandon(connection, writer);
            return;
        };

        let groups = match resolved {
            Ok(groups) => normalize_groups(groups),
            Err(e) => {
                warn!(
                    connection = %connection.id(),
                    user = %connection.user_id(),
                    error = %e,
                    "Membership lookup failed, closing connection"
                );
                self.abandon(connection, writer);
                return;
            }
        };

        let groups_changed = self.groups.add_member(&groups, &connection);
        let user_added = self
            .users
            .add_connection(connection.user_id(), connection.id());
        self.connections
            .insert(connection.id().clone(), Arc::clone(&connection));

        debug!(
            connection = %connection.id(),
            user = %connection.user_id(),
            groups = groups.len(),
            "Registered connection"
        );

        // Shutdown may have swept the map just before the insert.
        if self.shutdown.is_cancelled() {
            connection.close();
        }
        pump::spawn(Arc::clone(self), connection, outbox, reader, writer);

        if user_added {
            self.resubscribe(BridgeKind::Users);
        }
        if groups_changed {
            self.resubscribe(BridgeKind::Groups);
        }
        self.update_gauges();
    }

    fn remove(&self, connection: &Arc<Connection>) {
        connection.close();
        if self.connections.remove(connection.id()).is_none() {
            return;
        }

        let user_removed = self
            .users
            .remove_connection(connection.user_id(), connection.id());
        let groups_changed = self.groups.remove_member(connection);

        debug!(
            connection = %connection.id(),
            user = %connection.user_id(),
            "Unregistered connection"
        );

        if user_removed {
            self.resubscribe(BridgeKind::Users);
        }
        if groups_changed {
            self.resubscribe(BridgeKind::Groups);
        }
        self.update_gauges();
    }

    fn apply_groups_changed(&self, user_id: &str, groups: Vec<String>) {
        let groups = normalize_groups(groups);
        let frame = match codec::encode(&ClientEnvelope::GroupChange(GroupsBody::new(
            groups.clone(),
        ))) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(user = %user_id, error = %e, "Failed to encode group change");
                return;
            }
        };

        for id in self.users.connections_of(user_id) {
            let Some(connection) = self.connection(&id) else {
                continue;
            };

            if groups.is_empty() {
                debug!(connection = %id, user = %user_id, "User left every group");
                self.remove(&connection);
                continue;
            }

            let changed = self.groups.update_member(&groups, &connection);
            connection.deliver(frame.clone());
            debug!(
                connection = %id,
                user = %user_id,
                groups = groups.len(),
                "Updated membership"
            );

            if changed {
                self.resubscribe(BridgeKind::Groups);
            }
        }

        self.update_gauges();
    }

    fn update_gauges(&self) {
        metrics::set_active_connections(self.connections.len());
        metrics::set_active_groups(self.groups.len());
    }
}
