//! Connection and bootstrap manager.
//!
//! Turns bootstrap URLs into live broker transports, runs the metadata
//! handshake and keeps the node id maps. The manager is a single task that
//! owns every registry; resolution, connects, response waits and retry
//! timers run as spawned tasks and report back through a channel.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::address::{DnsResolver, ResolveState, Resolver};
use crate::config::ClientConfig;
use crate::connection_config::ConnectionConfig;
use crate::error::{ClientError, Result};
use crate::event::{
    ClientEvent, ConnectedEvent, ErrorKind, ResolvedEvent, UpdateTopicInformationEvent,
};
use crate::protocol::{decode, encode, Buffer, MetadataResponse};
use crate::util::hex_dump;

use super::retry::{plan_batch, MetadataRetryTask, RetryPolicy};
use super::topology::ClusterTopology;
use super::transport::{
    BrokerTransport, ConnectionId, TransportEvent, TransportOptions, TransportState,
};

/// Entry point: configure with [`ConnectionManager::builder`], then call
/// [`ConnectionManagerBuilder::bootstrap`].
#[derive(Debug)]
pub struct ConnectionManager;

impl ConnectionManager {
    #[must_use]
    pub fn builder(config: ClientConfig) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            config,
            resolver: Arc::new(DnsResolver),
        }
    }
}

/// Subscription and wiring set up before bootstrapping.
pub struct ConnectionManagerBuilder {
    config: ClientConfig,
    resolver: Arc<dyn Resolver>,
}

impl ConnectionManagerBuilder {
    /// Add a topic to request metadata for.
    #[must_use]
    pub fn subscribe(mut self, topic: impl Into<String>) -> Self {
        self.config.topics.push(topic.into());
        self
    }

    /// Replace the subscribed topics.
    #[must_use]
    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Ask brokers to create missing topics.
    #[must_use]
    pub fn auto_create_topics(mut self, enabled: bool) -> Self {
        self.config.auto_create_topics = enabled;
        self
    }

    /// Use a custom resolver instead of DNS.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Start the manager and connect to the configured bootstrap servers.
    ///
    /// Must be called from within a tokio runtime. Returns the handle and
    /// the receiving end of the event channel.
    #[must_use]
    pub fn bootstrap(self) -> (ManagerHandle, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let topology = ClusterTopology::new();

        let servers = self.config.bootstrap_servers();
        let actor = ManagerActor {
            policy: RetryPolicy::from(self.config.metadata_retry),
            options: TransportOptions {
                correlation: self.config.correlation,
                connect_timeout: self.config.connection_timeout(),
                max_frame_size: self.config.max_frame_size,
            },
            config: self.config,
            resolver: self.resolver,
            events: events_tx,
            internal_tx,
            transport_tx,
            tasks: JoinSet::new(),
            transports: Vec::new(),
            broker_connections: HashMap::new(),
            broker_configs: HashMap::new(),
            discovering: HashSet::new(),
            pending_discovery: HashMap::new(),
            next_connection_id: 0,
            metadata_requested: false,
            topology: topology.clone(),
        };

        let task = tokio::spawn(actor.run(servers, control_rx, internal_rx, transport_rx));

        (
            ManagerHandle {
                control: control_tx,
                topology,
                task,
            },
            events_rx,
        )
    }
}

/// State of one transport, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSnapshot {
    pub connection: ConnectionId,
    /// Configured `host:port`.
    pub address: String,
    pub broker_id: Option<i32>,
    pub state: TransportState,
}

/// The manager's registries at one point in time.
#[derive(Debug, Clone, Default)]
pub struct ManagerSnapshot {
    /// Transports in creation order.
    pub transports: Vec<TransportSnapshot>,
    /// Node id to the transport bound to it.
    pub broker_connections: HashMap<i32, ConnectionId>,
    /// Node id to the address metadata advertised for it.
    pub broker_configs: HashMap<i32, ConnectionConfig>,
}

#[derive(Debug)]
enum Control {
    Snapshot(oneshot::Sender<ManagerSnapshot>),
    Shutdown,
}

/// Handle to a running manager.
#[derive(Debug)]
pub struct ManagerHandle {
    control: mpsc::UnboundedSender<Control>,
    topology: ClusterTopology,
    task: JoinHandle<()>,
}

impl ManagerHandle {
    /// Shared view of the cluster, updated by every metadata response.
    #[must_use]
    pub fn topology(&self) -> ClusterTopology {
        self.topology.clone()
    }

    /// Current transports and node id maps.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Shutdown`] if the manager has stopped.
    pub async fn snapshot(&self) -> Result<ManagerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(Control::Snapshot(tx))
            .map_err(|_| ClientError::Shutdown)?;
        rx.await.map_err(|_| ClientError::Shutdown)
    }

    /// Ask the manager to close every transport and stop.
    pub fn shutdown(&self) {
        let _ = self.control.send(Control::Shutdown);
    }

    /// Wait for the manager to stop.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = %e, "connection manager task failed");
        }
    }
}

/// Results of spawned work, fed back into the actor.
enum Internal {
    Resolved {
        config: ConnectionConfig,
        node_id: Option<i32>,
    },
    Connected {
        connection: ConnectionId,
        result: Result<SocketAddr>,
    },
    MetadataResponse {
        connection: ConnectionId,
        task: MetadataRetryTask,
        response: Result<Buffer>,
    },
    RetryDue {
        connection: ConnectionId,
        task: MetadataRetryTask,
    },
}

struct ManagerActor {
    config: ClientConfig,
    resolver: Arc<dyn Resolver>,
    policy: RetryPolicy,
    options: TransportOptions,
    events: mpsc::UnboundedSender<ClientEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    tasks: JoinSet<()>,
    /// Transports in creation order.
    transports: Vec<Arc<BrokerTransport>>,
    broker_connections: HashMap<i32, ConnectionId>,
    broker_configs: HashMap<i32, ConnectionConfig>,
    /// Node ids a discovery connection was started for.
    discovering: HashSet<i32>,
    /// Discovery transports still connecting, with the node id they serve.
    pending_discovery: HashMap<ConnectionId, i32>,
    next_connection_id: u64,
    metadata_requested: bool,
    topology: ClusterTopology,
}

impl ManagerActor {
    async fn run(
        mut self,
        servers: Vec<String>,
        mut control: mpsc::UnboundedReceiver<Control>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        self.bootstrap(&servers);

        loop {
            tokio::select! {
                command = control.recv() => match command {
                    Some(Control::Snapshot(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(Control::Shutdown) | None => break,
                },
                Some(message) = internal.recv() => self.handle_internal(message),
                Some(event) = transport_events.recv() => self.handle_transport_event(event),
            }

            while self.tasks.try_join_next().is_some() {}
        }

        info!("connection manager shutting down");
        self.tasks.shutdown().await;
        for transport in &self.transports {
            transport.close().await;
        }
    }

    fn publish(&self, event: ClientEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    fn bootstrap(&mut self, servers: &[String]) {
        if let Err(e) = self.config.validate() {
            warn!(error = %e, "invalid client configuration");
            self.publish(ClientEvent::error(ErrorKind::InvalidConfiguration, e.to_string()));
            return;
        }

        if !servers.iter().any(|s| ConnectionConfig::is_supported_url(s)) {
            warn!(servers = ?servers, "no valid bootstrap server");
            self.publish(ClientEvent::error(
                ErrorKind::NoValidBootstrapServerGiven,
                "No valid server for bootstrapping has been found",
            ));
        }

        let mut seen = HashSet::new();
        for server in servers {
            if !ConnectionConfig::is_supported_url(server) || !seen.insert(server.as_str()) {
                continue;
            }

            match ConnectionConfig::parse_from_url(server) {
                Ok(config) => self.spawn_resolve(config, None),
                Err(e) => {
                    warn!(server = %server, error = %e, "invalid bootstrap server");
                    self.publish(ClientEvent::error(ErrorKind::DnsResolveFailed, e.to_string()));
                }
            }
        }
    }

    fn spawn_resolve(&mut self, mut config: ConnectionConfig, node_id: Option<i32>) {
        let resolver = Arc::clone(&self.resolver);
        let tx = self.internal_tx.clone();
        self.tasks.spawn(async move {
            config.address.resolve(resolver.as_ref()).await;
            let _ = tx.send(Internal::Resolved { config, node_id });
        });
    }

    fn spawn_connect(&mut self, transport: Arc<BrokerTransport>) {
        let tx = self.internal_tx.clone();
        let events = self.transport_tx.clone();
        self.tasks.spawn(async move {
            let result = transport.connect(events).await;
            let _ = tx.send(Internal::Connected {
                connection: transport.id(),
                result,
            });
        });
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Resolved { config, node_id } => self.on_resolved(config, node_id),
            Internal::Connected { connection, result } => self.on_connected(connection, result),
            Internal::MetadataResponse {
                connection,
                task,
                response,
            } => self.on_metadata_response(connection, task, response),
            Internal::RetryDue { connection, task } => self.on_retry_due(connection, task),
        }
    }

    fn on_resolved(&mut self, config: ConnectionConfig, node_id: Option<i32>) {
        match config.address.state().clone() {
            ResolveState::Resolved(socket_addr) => {
                self.publish(ClientEvent::Resolved(ResolvedEvent {
                    address: config.address.to_string(),
                    socket_addr,
                }));

                let id = ConnectionId(self.next_connection_id);
                self.next_connection_id += 1;

                let transport = Arc::new(BrokerTransport::new(id, config, self.options));
                if let Some(node_id) = node_id {
                    self.pending_discovery.insert(id, node_id);
                }
                self.transports.push(Arc::clone(&transport));
                self.spawn_connect(transport);
            }
            ResolveState::Failed(reason) => {
                warn!(address = %config.address, reason = %reason, "could not resolve broker");
                if let Some(node_id) = node_id {
                    self.discovering.remove(&node_id);
                }
                self.publish(ClientEvent::error(ErrorKind::DnsResolveFailed, reason));
            }
            ResolveState::Unresolved => {}
        }
    }

    fn on_connected(&mut self, connection: ConnectionId, result: Result<SocketAddr>) {
        match result {
            Ok(address) => {
                info!(connection = %connection, address = %address, "connected to broker");
                if let Some(node_id) = self.pending_discovery.remove(&connection) {
                    self.bind_discovered(connection, node_id);
                }
                self.publish(ClientEvent::Connected(ConnectedEvent {
                    connection,
                    address,
                }));

                if !self.metadata_requested {
                    self.metadata_requested = true;
                    let task = MetadataRetryTask::new(
                        self.config.topics.clone(),
                        self.config.auto_create_topics,
                    );
                    if let Some(transport) = self.transport(connection) {
                        self.send_metadata(transport, task);
                    }
                }
            }
            Err(e) => {
                if let Some(node_id) = self.pending_discovery.remove(&connection) {
                    // Allow the next metadata response to try this broker again.
                    self.discovering.remove(&node_id);
                }
                let kind = match &e {
                    ClientError::Connection(io) => ErrorKind::from_io_error(io),
                    _ => ErrorKind::UnknownTcpError,
                };
                self.publish(ClientEvent::error(kind, e.to_string()));
            }
        }
    }

    /// Record a discovery transport that connected as serving `node_id`.
    fn bind_discovered(&mut self, connection: ConnectionId, node_id: i32) {
        self.discovering.remove(&node_id);
        let Some(transport) = self.transport(connection) else {
            return;
        };
        transport.bind(node_id);
        self.broker_connections.insert(node_id, connection);
        self.broker_configs.insert(node_id, transport.config().clone());
        debug!(connection = %connection, broker_id = node_id, "bound discovered broker");
    }

    fn send_metadata(&mut self, transport: Arc<BrokerTransport>, task: MetadataRetryTask) {
        let request = match encode(&task.request()) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "failed to encode metadata request");
                return;
            }
        };

        debug!(
            connection = %transport.id(),
            topics = ?task.topics(),
            attempt = task.attempt(),
            "requesting metadata"
        );

        let tx = self.internal_tx.clone();
        self.tasks.spawn(async move {
            let response = match transport.send(request).await {
                Ok(pending) => pending.recv().await,
                Err(e) => Err(e),
            };
            let _ = tx.send(Internal::MetadataResponse {
                connection: transport.id(),
                task,
                response,
            });
        });
    }

    fn on_metadata_response(
        &mut self,
        connection: ConnectionId,
        task: MetadataRetryTask,
        response: Result<Buffer>,
    ) {
        let mut buffer = match response {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(connection = %connection, error = %e, "metadata request failed");
                return;
            }
        };

        let response: MetadataResponse = match decode(&mut buffer) {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    connection = %connection,
                    error = %e,
                    frame = %hex_dump(buffer.as_slice()),
                    "failed to decode metadata response"
                );
                return;
            }
        };

        self.topology.update(&response);

        for broker in &response.brokers {
            for transport in self.transports.iter().filter(|t| !t.is_terminated()) {
                if transport.consume_from_metadata(broker) {
                    self.broker_connections.insert(broker.node_id, transport.id());
                    self.broker_configs.insert(
                        broker.node_id,
                        ConnectionConfig::plaintext(broker.host.clone(), broker.port.to_string()),
                    );
                }
            }
        }

        if self.config.discover_brokers {
            self.discover_brokers(&response);
        }

        let plan = plan_batch(&self.policy, &task, response.topics);
        for topic in plan.publish {
            self.publish(ClientEvent::UpdateTopicInformation(
                UpdateTopicInformationEvent { topic },
            ));
        }

        if let Some((task, delay)) = plan.retry {
            self.schedule_retry(connection, task, delay);
        }
    }

    /// Open transports to brokers no transport is bound to.
    fn discover_brokers(&mut self, response: &MetadataResponse) {
        for broker in &response.brokers {
            if self.broker_connections.contains_key(&broker.node_id)
                || !self.discovering.insert(broker.node_id)
            {
                continue;
            }

            info!(
                broker_id = broker.node_id,
                host = %broker.host,
                port = broker.port,
                "discovered broker"
            );
            let config = ConnectionConfig::plaintext(broker.host.clone(), broker.port.to_string());
            self.spawn_resolve(config, Some(broker.node_id));
        }
    }

    fn schedule_retry(&mut self, connection: ConnectionId, task: MetadataRetryTask, delay: Duration) {
        info!(
            attempt = task.attempt(),
            delay_ms = delay.as_millis() as u64,
            "retrying metadata request"
        );
        let tx = self.internal_tx.clone();
        self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::RetryDue { connection, task });
        });
    }

    fn on_retry_due(&mut self, connection: ConnectionId, task: MetadataRetryTask) {
        let transport = self
            .transport(connection)
            .filter(|t| t.is_connected())
            .or_else(|| self.transports.iter().find(|t| t.is_connected()).cloned());

        match transport {
            Some(transport) => self.send_metadata(transport, task),
            None => warn!(attempt = task.attempt(), "no connected broker for metadata retry"),
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Closed { connection } => {
                debug!(connection = %connection, "transport closed");
            }
            TransportEvent::Failed { connection, error } => {
                debug!(connection = %connection, reason = %error.reason, "transport failed");
                self.publish(ClientEvent::Error(error));
            }
        }
    }

    fn transport(&self, connection: ConnectionId) -> Option<Arc<BrokerTransport>> {
        self.transports
            .iter()
            .find(|t| t.id() == connection)
            .cloned()
    }

    fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            transports: self
                .transports
                .iter()
                .map(|t| TransportSnapshot {
                    connection: t.id(),
                    address: t.config().address.to_string(),
                    broker_id: t.broker_id(),
                    state: t.state(),
                })
                .collect(),
            broker_connections: self.broker_connections.clone(),
            broker_configs: self.broker_configs.clone(),
        }
    }
}
