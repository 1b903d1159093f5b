//! Relay worker entry point

use anyhow::Context;
use clap::Parser;
use config::ServiceConfig;
use network::{BackoffConfig, StreamDriver, WebSocketGossipSource};
use prometheus::Registry;
use relay_worker::{http, DryRunAdapter, RelayFeeder, RelayWorker, RelayWorkerMetrics};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Environment overlay (loads environments/<env>.toml next to the config file)
    #[arg(short, long)]
    env: Option<String>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_worker=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting relay worker");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::load(args.config.as_deref(), args.env.as_deref())
        .context("failed to load configuration")?;
    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }
    info!("Configuration loaded: {:?}", config);

    let registry = Registry::new();
    let metrics = Arc::new(RelayWorkerMetrics::new(&registry)?);
    info!("No chain adapter configured, relaying in dry-run mode");
    let worker = Arc::new(RelayWorker::new(
        Arc::new(DryRunAdapter),
        &config.relay,
        metrics,
    ));

    let gossip = &config.gossip;
    let driver = StreamDriver::new(
        Arc::new(WebSocketGossipSource::new(gossip.endpoint.clone())),
        BackoffConfig::from_millis(
            gossip.reconnect_delay_ms,
            gossip.max_reconnect_delay_ms,
            gossip.jitter_ms,
        ),
    );
    let feeder = Arc::new(RelayFeeder::new(
        worker.clone(),
        config.listener.dedup_capacity,
        config.listener.dedup_ttl(),
    ));

    let (_, status_server) = http::start(worker.clone(), registry, config.relay.status_port)?;
    let feeder_task = feeder.spawn(driver);
    let worker_task = tokio::spawn(worker.run());

    tokio::select! {
        result = worker_task => {
            if let Err(e) = result {
                error!("Relay worker task failed: {}", e);
            }
        }
        result = feeder_task => {
            if let Err(e) = result {
                error!("Gossip feeder task failed: {}", e);
            }
        }
        result = status_server => {
            if let Err(e) = result {
                error!("Status server failed: {}", e);
            }
        }
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
