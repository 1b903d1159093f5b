//! Price service entry point

use anyhow::Context;
use clap::Parser;
use config::ServiceConfig;
use network::WebSocketGossipSource;
use price_service::PriceService;
use prometheus::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
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
                .unwrap_or_else(|_| "price_service=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting price service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::load(args.config.as_deref(), args.env.as_deref())
        .context("failed to load configuration")?;
    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }
    info!("Configuration loaded: {:?}", config);

    let source = Arc::new(WebSocketGossipSource::new(config.gossip.endpoint.clone()));
    let service = PriceService::new(&config, source, Registry::new())?;
    let running = service.start()?;

    tokio::select! {
        _ = running.wait() => {
            info!("Background task ended, exiting");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
