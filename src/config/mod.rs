//! Configuration
//!
//! TOML file with two layers of environment overrides: `${VAR:-default}`
//! substitution inside the file, and `EMBERMQ__SECTION__KEY` variables
//! on top (double underscore separates nesting).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

use crate::broker::{BrokerConfig, OverflowStrategy};


/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading the config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Semantic validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "io error: {}", e),
            ConfigError::Parse(e) => write!(f, "parse error: {}", e),
            ConfigError::Config(e) => write!(f, "config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Substitute `${VAR}` and `${VAR:-default}` in the raw file content.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub server: ServerConfig,
    pub broker: BrokerSection,
    pub auth: AuthConfig,
    pub metrics: MetricsConfig,
    pub persistence: PersistenceConfig,
    pub peers: PeersConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// error, warn, info, debug or trace
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP bind address
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    "0.0.0.0:1883".parse().unwrap()
}

/// Protocol engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    /// Accept CONNECT without credentials
    pub allow_anonymous_connect: bool,
    /// Cap on concurrent sessions; 0 means unlimited
    pub max_connections: usize,
    /// Per-write socket deadline in milliseconds
    pub io_timeout_ms: u64,
    /// Writes slower than this many milliseconds are counted and logged
    pub client_slow_threshold_ms: u64,
    /// "block" or "discard" when the outbound queue is full
    pub buff_overflow_strategy: OverflowStrategy,
    /// Debug-log every inbound and outbound message
    pub echo: bool,
    /// Bound of the per-connection outbound job queue
    pub outbound_queue_capacity: usize,
    /// Cap on a single inbound packet in bytes
    pub max_packet_size: usize,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            allow_anonymous_connect: true,
            max_connections: 0,
            io_timeout_ms: 5000,
            client_slow_threshold_ms: 500,
            buff_overflow_strategy: OverflowStrategy::Block,
            echo: false,
            outbound_queue_capacity: 1024,
            max_packet_size: 1024 * 1024,
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Static user list; empty means any credentials pass
    pub users: Vec<UserConfig>,
}

/// One configured user
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub bind: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1:9090".parse().unwrap(),
        }
    }
}

/// Durable message-log configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "embermq-data".to_string(),
        }
    }
}

/// Peer forwarding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    /// Topics with these prefixes are forwarded to peers
    pub global_topic_prefixes: Vec<String>,
}

impl Config {
    /// Load from a TOML file with env-var substitution and
    /// `EMBERMQ__SECTION__KEY` overrides. A missing file falls back to
    /// defaults so env-only deployments work.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        match std::fs::read_to_string(path.as_ref()) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ConfigError::Io(e)),
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("EMBERMQ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a string; no env-var support. Test helper.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.outbound_queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "broker.outbound_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.broker.io_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "broker.io_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.broker.max_packet_size == 0 {
            return Err(ConfigError::Validation(
                "broker.max_packet_size must be at least 1".to_string(),
            ));
        }
        for user in &self.auth.users {
            if user.username.is_empty() {
                return Err(ConfigError::Validation(
                    "auth user with empty username".to_string(),
                ));
            }
            if user.password.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "auth user '{}' has an empty password",
                    user.username
                )));
            }
        }
        Ok(())
    }

    /// Runtime broker configuration for this file
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            bind_addr: self.server.bind,
            allow_anonymous_connect: self.broker.allow_anonymous_connect,
            max_connections: self.broker.max_connections,
            io_timeout: Duration::from_millis(self.broker.io_timeout_ms),
            client_slow_threshold: Duration::from_millis(self.broker.client_slow_threshold_ms),
            overflow_strategy: self.broker.buff_overflow_strategy,
            echo: self.broker.echo,
            outbound_queue_capacity: self.broker.outbound_queue_capacity,
            max_packet_size: self.broker.max_packet_size,
            global_topic_prefixes: self.peers.global_topic_prefixes.clone(),
        }
    }

    /// Username -> password map for the static authenticator
    pub fn user_map(&self) -> HashMap<String, String> {
        self.auth
            .users
            .iter()
            .map(|u| (u.username.clone(), u.password.clone()))
            .collect()
    }
}
