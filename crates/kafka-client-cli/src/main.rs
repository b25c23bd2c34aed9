//! Kafka Client CLI
//!
//! Bootstraps a connection to a Kafka cluster, runs the metadata handshake
//! and prints every event the client publishes until interrupted.

use std::path::PathBuf;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kafka_client_core::config::{ClientConfig, LoggingConfig};
use kafka_client_core::{ClientEvent, ConnectionManager, ManagerHandle};

const DEFAULT_BOOTSTRAP_SERVER: &str = "plaintext://localhost:9092";
const DEFAULT_TOPIC: &str = "test";

/// Kafka bootstrap client.
#[derive(Parser)]
#[command(name = "kafka-client")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bootstrap server URL, e.g. plaintext://localhost:9092. Repeatable.
    #[arg(short, long = "bootstrap")]
    bootstrap: Vec<String>,

    /// Topic to request metadata for. Repeatable.
    #[arg(short, long = "topic")]
    topic: Vec<String>,

    /// Ask brokers to create missing topics.
    #[arg(long)]
    auto_create: bool,

    /// Log as JSON.
    #[arg(long)]
    json: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => {
            let mut config = ClientConfig::new(vec![DEFAULT_BOOTSTRAP_SERVER.to_string()]);
            config.topics = vec![DEFAULT_TOPIC.to_string()];
            config
        }
    };

    // Apply CLI overrides
    if !args.bootstrap.is_empty() {
        config.bootstrap_servers = args.bootstrap;
    }
    if !args.topic.is_empty() {
        config.topics = args.topic;
    }
    if args.auto_create {
        config.auto_create_topics = true;
    }
    if args.json {
        config.logging.json = true;
    }
    config.validate()?;

    let log_config = match args.verbose {
        0 => config.logging.clone(),
        1 => LoggingConfig {
            level: "debug".to_string(),
            ..config.logging.clone()
        },
        _ => LoggingConfig {
            level: "trace".to_string(),
            ..config.logging.clone()
        },
    };

    setup_tracing(&log_config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bootstrap_servers = ?config.bootstrap_servers,
        topics = ?config.topics,
        "starting kafka client"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move { run_client(config).await })
}

fn setup_tracing(config: &LoggingConfig) {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }
}

async fn run_client(config: ClientConfig) -> anyhow::Result<()> {
    let (handle, mut events) = ConnectionManager::builder(config).bootstrap();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            () = &mut shutdown => {
                info!("shutdown signal received, stopping client");
                break;
            }
        }
    }

    print_topology(&handle).await;
    handle.shutdown();
    handle.join().await;

    info!("client shutdown complete");
    Ok(())
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::Error(e) => error!(kind = %e.kind, reason = %e.reason, "client error"),
        ClientEvent::Resolved(e) => {
            info!(address = %e.address, resolved = %e.socket_addr, "broker resolved");
        }
        ClientEvent::Connected(e) => {
            info!(connection = %e.connection, address = %e.address, "broker connected");
        }
        ClientEvent::UpdateTopicInformation(e) => {
            let topic = &e.topic;
            if topic.error_code == 0 {
                info!(
                    topic = %topic.name,
                    partitions = topic.partitions.len(),
                    internal = topic.is_internal,
                    "topic metadata"
                );
            } else {
                warn!(
                    topic = %topic.name,
                    error_code = topic.error_code,
                    "topic metadata carries an error"
                );
            }
        }
    }
}

async fn print_topology(handle: &ManagerHandle) {
    let topology = handle.topology();
    info!(
        cluster_id = ?topology.cluster_id(),
        controller_id = ?topology.controller_id(),
        brokers = topology.broker_count(),
        "cluster topology"
    );

    match handle.snapshot().await {
        Ok(snapshot) => {
            for transport in snapshot.transports {
                info!(
                    connection = %transport.connection,
                    address = %transport.address,
                    broker_id = ?transport.broker_id,
                    state = ?transport.state,
                    "transport"
                );
            }
        }
        Err(e) => warn!(error = %e, "could not read manager state"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
