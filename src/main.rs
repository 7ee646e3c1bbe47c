//! embermq - MQTT v3.1 broker
//!
//! Usage:
//!   embermq [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path (TOML)
//!   -b, --bind <ADDR>      Bind address (default: 0.0.0.0:1883)
//!   --max-connections <N>  Session cap (0 = unlimited)
//!   --echo                 Debug-log every message in both directions
//!   -l, --log-level        Log level (error, warn, info, debug, trace)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use embermq::auth::StaticAuth;
use embermq::persistence::FjallBackend;
use embermq::{Config, MetricsServer, Server};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }

    fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

/// embermq - MQTT v3.1 broker
#[derive(Parser, Debug)]
#[command(name = "embermq")]
#[command(version = "0.1.0")]
#[command(about = "Lightweight MQTT v3.1 message broker")]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Maximum concurrent sessions (0 = unlimited)
    #[arg(long)]
    max_connections: Option<usize>,

    /// Debug-log every inbound and outbound message
    #[arg(long)]
    echo: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let file_config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("error loading config file: {}", e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    // CLI beats file, file beats defaults
    let log_level = args
        .log_level
        .unwrap_or_else(|| LogLevel::parse(&file_config.log.level));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("loaded configuration from {:?}", path);
    }

    let mut broker_config = file_config.broker_config();
    if let Some(bind) = args.bind {
        broker_config.bind_addr = bind;
    }
    if let Some(max) = args.max_connections {
        broker_config.max_connections = max;
    }
    if args.echo {
        broker_config.echo = true;
    }

    info!("starting embermq");
    info!("  bind address: {}", broker_config.bind_addr);
    info!(
        "  max connections: {}",
        if broker_config.max_connections == 0 {
            "unlimited".to_string()
        } else {
            broker_config.max_connections.to_string()
        }
    );
    info!("  overflow strategy: {:?}", broker_config.overflow_strategy);

    let mut server = Server::new(broker_config);

    if !file_config.auth.users.is_empty() {
        let auth = StaticAuth::new(file_config.user_map());
        info!("  authentication: {} configured users", auth.user_count());
        server.set_authenticator(Arc::new(auth));
    } else {
        info!("  authentication: open");
    }

    if file_config.persistence.enabled {
        let backend = FjallBackend::open(&file_config.persistence.path)?;
        info!("  persistence: {}", file_config.persistence.path);
        server.set_storage(Arc::new(backend));
    } else {
        info!("  persistence: disabled");
    }

    if file_config.metrics.enabled {
        let metrics_server = MetricsServer::new(server.metrics(), file_config.metrics.bind);
        info!("  metrics: http://{}/metrics", file_config.metrics.bind);
        tokio::spawn(async move {
            if let Err(e) = metrics_server.run().await {
                tracing::error!("metrics server: {}", e);
            }
        });
    } else {
        info!("  metrics: disabled");
    }

    server.run().await?;

    Ok(())
}
