//! Order book synchronization daemon - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Multi-exchange order book synchronization daemon
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via LOB_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    lob_telemetry::init_logging()?;

    info!("Starting lobd v{}", env!("CARGO_PKG_VERSION"));

    // Determine config path: CLI arg > LOB_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("LOB_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = lob_daemon::AppConfig::from_file(&config_path)?;
    info!(
        subscriptions = config.subscriptions.len(),
        "Configuration loaded"
    );

    let app = lob_daemon::Application::new(config)?;
    app.run().await?;

    Ok(())
}
