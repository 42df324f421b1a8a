//! # Region Daemon
//!
//! Runs the region end of the region/rack control channel until Ctrl-C.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use region_runtime::config::RegionConfig;
use region_runtime::RegionRuntime;

/// Region controller RPC daemon
#[derive(Parser, Debug)]
#[command(name = "region-runtime")]
#[command(about = "Accepts rack controller connections and brokers RPC calls to them")]
struct Args {
    /// TOML configuration file (overrides REGION_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = RegionConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let _telemetry =
        region_telemetry::init_telemetry(&config.telemetry).context("Failed to initialise telemetry")?;

    let runtime = RegionRuntime::new(&config).context("Invalid configuration")?;
    runtime.start().await.context("Failed to start RPC service")?;

    info!("Region is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    runtime.shutdown().await;
    Ok(())
}
