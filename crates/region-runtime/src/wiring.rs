//! # Event Wiring
//!
//! Routes rack connection events from the broker's bus to the log.
//!
//! ```text
//! Registry ──RackEvent──▶ InMemoryEventBus ──▶ event logger ──▶ tracing
//! ```

use region_telemetry::log_rack_event;
use shared_bus::{RackEvent, Subscription};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Log every event of `events` until `shutdown` fires or the bus closes.
pub fn spawn_event_logger(mut events: Subscription, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Some(RackEvent::Connected {
                    identity,
                    connection_id,
                }) => log_rack_event!(
                    info,
                    "Rack controller connected",
                    identity,
                    connection_id = %connection_id
                ),
                Some(RackEvent::Disconnected {
                    identity,
                    connection_id,
                }) => log_rack_event!(
                    info,
                    "Rack controller disconnected",
                    identity,
                    connection_id = %connection_id
                ),
                None => break,
            }
        }
        debug!("Rack event logger stopped");
    })
}
