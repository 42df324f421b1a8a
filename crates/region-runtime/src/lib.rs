//! # Region Runtime
//!
//! Wires configuration, the rack inventory, port discovery and the event
//! bus into a [`RegionService`] and runs it.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults, file, environment)
//! 2. Validate the shared secret is set
//! 3. Initialise telemetry
//! 4. Start the event logger
//! 5. Bind the RPC endpoint and publish its port
//!
//! ## Shutdown Sequence
//!
//! 1. Stop the RPC service (listener, waiters, connections)
//! 2. Stop the event logger
//! 3. Log the final metrics snapshot at debug level

pub mod config;
pub mod wiring;

use crate::config::{ConfigError, RegionConfig};
use region_rpc::adapters::{FileDiscoveryPublisher, LoggingDiscoveryPublisher};
use region_rpc::ports::DiscoveryPublisher;
use region_rpc::{
    BrokerError, Dispatcher, InMemoryRegistrar, RegionDependencies, RegionService,
};
use shared_bus::{EventFilter, InMemoryEventBus};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The region daemon.
pub struct RegionRuntime {
    service: Arc<RegionService>,
    events: Arc<InMemoryEventBus>,
    shutdown: CancellationToken,
    event_logger: Mutex<Option<JoinHandle<()>>>,
}

impl RegionRuntime {
    /// Build the runtime. Fails if the configuration is not production ready.
    pub fn new(config: &RegionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::with_handlers(config, Dispatcher::new())
    }

    /// Build the runtime with application commands racks may call.
    pub fn with_handlers(config: &RegionConfig, handlers: Dispatcher) -> Result<Self, ConfigError> {
        let secret = config.security.secret()?;

        let mut registrar = InMemoryRegistrar::new();
        if let Some(uuid) = &config.rpc.region_uuid {
            registrar = registrar.with_region_uuid(uuid.clone());
        }
        if let Some(hostnames) = &config.rpc.allowed_hostnames {
            registrar = registrar.allow_only(hostnames.iter().cloned());
        }

        let discovery: Arc<dyn DiscoveryPublisher> = match &config.rpc.discovery_file {
            Some(path) => Arc::new(FileDiscoveryPublisher::new(path.clone())),
            None => Arc::new(LoggingDiscoveryPublisher),
        };

        let events = Arc::new(InMemoryEventBus::new());
        let service = RegionService::new(
            config.service_config(),
            RegionDependencies {
                secret,
                registrar: Arc::new(registrar),
                discovery,
                events: events.clone(),
                handlers,
            },
        );

        Ok(Self {
            service: Arc::new(service),
            events,
            shutdown: CancellationToken::new(),
            event_logger: Mutex::new(None),
        })
    }

    /// Start the event logger and the RPC service. Returns the bound port.
    pub async fn start(&self) -> Result<u16, BrokerError> {
        {
            let mut logger = self.event_logger.lock().await;
            if logger.is_none() {
                *logger = Some(wiring::spawn_event_logger(
                    self.events.subscribe(EventFilter::all()),
                    self.shutdown.child_token(),
                ));
            }
        }

        let port = self.service.start().await?;
        info!(port, "Region is accepting rack controllers");
        Ok(port)
    }

    /// Stop the RPC service, then the event logger.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");

        match self.service.stop().await {
            Ok(()) => {}
            Err(BrokerError::NotRunning) => debug!("RPC service was not running"),
            Err(e) => warn!(error = %e, "Failed to stop RPC service"),
        }

        self.shutdown.cancel();
        if let Some(logger) = self.event_logger.lock().await.take() {
            if let Err(e) = logger.await {
                warn!(error = %e, "Event logger ended abnormally");
            }
        }

        match region_telemetry::encode_metrics() {
            Ok(text) => debug!(metrics = %text, "Final metrics"),
            Err(e) => debug!(error = %e, "Metrics unavailable"),
        }

        info!("Shutdown complete");
    }

    pub fn service(&self) -> &Arc<RegionService> {
        &self.service
    }

    pub fn events(&self) -> &Arc<InMemoryEventBus> {
        &self.events
    }
}
