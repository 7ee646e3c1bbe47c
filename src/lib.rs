//! embermq - a lightweight MQTT v3.1 message broker
//!
//! Per-connection protocol engine with a single sequential reader and
//! writer, wildcard subscription fan-out, duplicate-client takeover and
//! a keep-alive watchdog.

pub mod auth;
pub mod broker;
pub mod buffer_pool;
pub mod codec;
pub mod config;
pub mod metrics;
pub mod persistence;
pub mod protocol;
pub mod remote;
pub mod topic;

pub use auth::{AllowAll, Authenticator, StaticAuth};
pub use broker::{BrokerConfig, OverflowStrategy, Server};
pub use config::Config;
pub use metrics::{Metrics, MetricsServer};
pub use persistence::{FjallBackend, StorageBackend, Store};
pub use protocol::{Packet, QoS, ReturnCode};
pub use remote::{NoopPeers, PeerRouter};
pub use topic::SubscriptionRegistry;
