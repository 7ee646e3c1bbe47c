//! Broker core
//!
//! The server owns the shared state (subscription registry, client
//! table, metrics, providers) and spawns an inbound/outbound task pair
//! per accepted connection.

mod clients;
mod connection;
mod writer;

pub use clients::ClientTable;
pub use connection::{ConnectInfo, Connection, Job, Receipt};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::auth::{AllowAll, Authenticator};
use crate::buffer_pool;
use crate::codec::{Decoder, Encoder};
use crate::metrics::Metrics;
use crate::persistence::{NullBackend, StorageBackend};
use crate::protocol::{Publish, QoS};
use crate::remote::{NoopPeers, PeerRouter};
use crate::topic::SubscriptionRegistry;

/// Behavior of `submit` when the outbound queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowStrategy {
    /// The caller waits for space
    Block,
    /// The message is dropped and logged
    Discard,
}

/// Runtime broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// TCP bind address
    pub bind_addr: SocketAddr,
    /// Reject CONNECT without credentials when false
    pub allow_anonymous_connect: bool,
    /// Cap on concurrent sessions; 0 means unlimited
    pub max_connections: usize,
    /// Per-write socket deadline
    pub io_timeout: Duration,
    /// Writes slower than this are counted and logged
    pub client_slow_threshold: Duration,
    /// Full-queue behavior of `submit`
    pub overflow_strategy: OverflowStrategy,
    /// Debug-log every inbound and outbound message
    pub echo: bool,
    /// Bound of the per-connection outbound job queue
    pub outbound_queue_capacity: usize,
    /// Cap on a single inbound packet's remaining length
    pub max_packet_size: usize,
    /// Topics with one of these prefixes are forwarded to peers
    pub global_topic_prefixes: Vec<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:1883".parse().unwrap(),
            allow_anonymous_connect: true,
            max_connections: 0,
            io_timeout: Duration::from_secs(5),
            client_slow_threshold: Duration::from_millis(500),
            overflow_strategy: OverflowStrategy::Block,
            echo: false,
            outbound_queue_capacity: 1024,
            max_packet_size: 1024 * 1024,
            global_topic_prefixes: Vec::new(),
        }
    }
}

/// The MQTT broker
pub struct Server {
    config: Arc<BrokerConfig>,
    registry: Arc<SubscriptionRegistry>,
    clients: Arc<ClientTable>,
    metrics: Arc<Metrics>,
    auth: Arc<dyn Authenticator>,
    peers: Arc<dyn PeerRouter>,
    storage: Arc<dyn StorageBackend>,
}

impl Server {
    /// Create a server with default providers: anonymous auth, no peer
    /// forwarding, no durable store.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(SubscriptionRegistry::new()),
            clients: Arc::new(ClientTable::new()),
            metrics: Arc::new(Metrics::new()),
            auth: Arc::new(AllowAll),
            peers: Arc::new(NoopPeers),
            storage: Arc::new(NullBackend),
        }
    }

    pub fn set_authenticator(&mut self, auth: Arc<dyn Authenticator>) {
        self.auth = auth;
    }

    pub fn set_peers(&mut self, peers: Arc<dyn PeerRouter>) {
        self.peers = peers;
    }

    pub fn set_storage(&mut self, storage: Arc<dyn StorageBackend>) {
        self.storage = storage;
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Number of registered client sessions
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of live (pattern, connection) subscription entries
    pub fn subscription_count(&self) -> usize {
        self.registry.subscription_count()
    }

    /// Inject a publish without a client connection. Used by embedders
    /// and tests; flows through the same fan-out as client publishes.
    pub async fn publish(&self, topic: &str, payload: Bytes, qos: QoS, retain: bool) {
        let publish = Publish {
            dup: false,
            qos,
            retain,
            topic: topic.into(),
            message_id: 0,
            payload,
        };
        self.registry.submit(&publish).await;
    }

    /// Accept loop. Runs until the listener fails.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!("MQTT/TCP listening on {}", self.config.bind_addr);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("new connection from {}", addr);
                    self.handle_connection(stream, addr);
                }
                Err(e) => {
                    error!("accept failed: {}", e);
                }
            }
        }
    }

    /// Wire up one connection: split the stream, build the shared
    /// handle and spawn the loop pair.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay for {}: {}", addr, e);
        }

        let (reader, writer) = stream.into_split();
        let (jobs_tx, jobs_rx) = mpsc::channel(self.config.outbound_queue_capacity);

        let conn = Arc::new(Connection::new(
            addr,
            jobs_tx,
            self.config.overflow_strategy,
        ));
        let store = self.storage.open(&addr.to_string());

        let inbound = connection::Inbound {
            conn: conn.clone(),
            reader,
            read_buf: buffer_pool::get_buffer(),
            decoder: Decoder::new().with_max_packet_size(self.config.max_packet_size),
            config: self.config.clone(),
            registry: self.registry.clone(),
            clients: self.clients.clone(),
            store: store.clone(),
            auth: self.auth.clone(),
            peers: self.peers.clone(),
            metrics: self.metrics.clone(),
        };

        let outbound = writer::Outbound {
            conn,
            writer,
            jobs: jobs_rx,
            write_buf: buffer_pool::get_buffer(),
            encoder: Encoder::new(),
            config: self.config.clone(),
            registry: self.registry.clone(),
            clients: self.clients.clone(),
            store,
            metrics: self.metrics.clone(),
        };

        tokio::spawn(inbound.run());
        tokio::spawn(outbound.run());
    }
}
