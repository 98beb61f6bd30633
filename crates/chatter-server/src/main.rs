//! # Chatter Server
//!
//! Realtime presence and direct messaging hub.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! chatter
//!
//! # Run with custom config
//! chatter --config /path/to/chatter.toml
//!
//! # Run with environment variables
//! CHATTER_PORT=8080 CHATTER_HOST=0.0.0.0 CHATTER_JWT_SECRET=... chatter
//! ```

use anyhow::Result;
use chatter_server::{config::Config, handlers, metrics};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "chatter", version, about = "Realtime presence and messaging hub")]
struct Args {
    /// Configuration file. Skips the default search paths.
    #[arg(short, long, env = "CHATTER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatter=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    // No secret, no hub
    config.validate()?;

    tracing::info!("Starting chatter server on {}:{}", config.host, config.port);

    // The hub does not run without its store
    let store = config.storage.open()?;

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config, store).await?;

    Ok(())
}
