//! # Rack Agent
//!
//! A minimal rack controller: connects to a region, authenticates both ways,
//! registers, then answers `DescribePowerTypes` and `Ping` until Ctrl-C or
//! until the region drops the connection.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::info;

use region_rpc::{handler_fn, Dispatcher, RackConnector};
use region_telemetry::TelemetryConfig;
use shared_types::{RegistrationRequest, SharedSecret, PING};

/// Connect a rack controller to a region
#[derive(Parser, Debug)]
#[command(name = "rack-agent")]
#[command(about = "Registers a rack controller with a region and serves its commands")]
struct Args {
    /// Region RPC endpoint
    #[arg(short, long, default_value = "127.0.0.1:5250")]
    region: SocketAddr,

    /// Hostname to register under
    #[arg(long, default_value = "rack-agent")]
    hostname: String,

    /// System id from a previous registration; empty on first contact
    #[arg(long, default_value = "")]
    system_id: String,

    /// Hex-encoded shared secret
    #[arg(long, env = "REGION_SHARED_SECRET", hide_env_values = true)]
    secret: String,

    /// Seconds to wait for the region's handshake answer
    #[arg(long, default_value = "30")]
    handshake_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let telemetry = TelemetryConfig {
        service_name: "rack-agent".to_string(),
        ..TelemetryConfig::default()
    }
    .with_env_overrides();
    let _telemetry =
        region_telemetry::init_telemetry(&telemetry).context("Failed to initialise telemetry")?;

    let secret = SharedSecret::from_hex(&args.secret).context("Invalid shared secret")?;
    secret.validate().context("Invalid shared secret")?;

    let mut registration = RegistrationRequest::new(args.system_id, args.hostname);
    registration.version = Some(env!("CARGO_PKG_VERSION").to_string());

    let handlers = Dispatcher::new()
        .with(
            "DescribePowerTypes",
            handler_fn(|_| std::future::ready(Ok(json!({ "power_types": ["ipmi", "manual"] })))),
        )
        .with(PING, handler_fn(|_| std::future::ready(Ok(json!({})))));

    let session = RackConnector::new(secret, registration)
        .with_handlers(handlers)
        .with_handshake_timeout(Duration::from_secs(args.handshake_timeout))
        .connect(args.region)
        .await
        .with_context(|| format!("Failed to join region at {}", args.region))?;

    info!(
        system_id = %session.identity(),
        region = %args.region,
        "Rack agent registered. Press Ctrl+C to stop."
    );

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            session
                .connection
                .close()
                .await
                .context("Failed to close region connection")?;
        }
        _ = session.connection.closed() => info!("Region closed the connection"),
    }

    Ok(())
}
