//! # Region Service
//!
//! Owns the listener and the registry lifecycle.
//!
//! ## Start
//!
//! 1. Bind the first candidate port that succeeds.
//! 2. Publish the bound port through the [`DiscoveryPublisher`].
//! 3. Accept sockets; each one becomes a [`Connection`] that the region
//!    challenges with the shared secret before anything but `Authenticate`
//!    is answered.
//!
//! ## Stop
//!
//! Cancel a bind still in progress, close the listener, reject every waiter
//! with [`BrokerError::Stopping`], then close every registered connection.
//! A connection that fails to close is logged and does not hold up the
//! others.

use crate::domain::BrokerError;
use crate::ports::{DiscoveryPublisher, RackRegistrar};
use crate::service::handshake::{authenticate_peer, AuthenticateHandler, DEFAULT_HANDSHAKE_TIMEOUT};
use crate::service::registration::{identify_handler, ping_handler, RegisterRackControllerHandler};
use crate::service::{Client, Connection, ConnectionConfig, ConnectionContext, Dispatcher, Registry};
use crate::transport::bind_first;
use futures::future::join_all;
use region_telemetry::HANDSHAKE_FAILURES;
use shared_bus::EventPublisher;
use shared_types::{RackIdentity, SharedSecret, AUTHENTICATE, IDENTIFY, PING, REGISTER_RACK_CONTROLLER};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Candidate ports, tried in order.
pub const DEFAULT_PORTS: std::ops::RangeInclusive<u16> = 5250..=5259;

/// Default wait in [`RegionService::client_for`].
pub const DEFAULT_CLIENT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Back-off after a failed `accept`.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Listener and handshake settings.
#[derive(Debug, Clone)]
pub struct RegionServiceConfig {
    /// Event-loop name answered to `Identify`.
    pub name: String,
    /// Software version sent to racks that declare one.
    pub version: String,
    pub bind_address: IpAddr,
    /// Candidate ports, bound first-success-wins.
    pub ports: Vec<u16>,
    /// Bound on the rack's answer to our challenge.
    pub handshake_timeout: Duration,
    /// Default wait for [`RegionService::client_for`].
    pub client_wait_timeout: Duration,
    pub connection: ConnectionConfig,
}

impl Default for RegionServiceConfig {
    fn default() -> Self {
        Self {
            name: "regiond".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ports: DEFAULT_PORTS.collect(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            client_wait_timeout: DEFAULT_CLIENT_WAIT_TIMEOUT,
            connection: ConnectionConfig::default(),
        }
    }
}

/// Collaborators of the region service.
pub struct RegionDependencies {
    pub secret: SharedSecret,
    pub registrar: Arc<dyn RackRegistrar>,
    pub discovery: Arc<dyn DiscoveryPublisher>,
    pub events: Arc<dyn EventPublisher>,
    /// Application commands racks may call. The built-in `Authenticate`,
    /// `RegisterRackController`, `Identify` and `Ping` take precedence.
    pub handlers: Dispatcher,
}

struct Running {
    accept_shutdown: CancellationToken,
    connections_shutdown: CancellationToken,
    accept_task: JoinHandle<()>,
}

/// The region end of the control channel.
pub struct RegionService {
    config: RegionServiceConfig,
    secret: SharedSecret,
    registry: Arc<Registry>,
    dispatcher: Arc<Dispatcher>,
    discovery: Arc<dyn DiscoveryPublisher>,
    lifecycle: tokio::sync::Mutex<Option<Running>>,
    pending_bind: parking_lot::Mutex<Option<CancellationToken>>,
    port: parking_lot::Mutex<Option<u16>>,
}

impl RegionService {
    pub fn new(config: RegionServiceConfig, deps: RegionDependencies) -> Self {
        let mut dispatcher = deps.handlers;
        dispatcher
            .register(AUTHENTICATE, AuthenticateHandler::new(deps.secret.clone()))
            .register(
                REGISTER_RACK_CONTROLLER,
                RegisterRackControllerHandler::new(deps.registrar, config.version.clone()),
            )
            .register(IDENTIFY, identify_handler(config.name.clone()))
            .register(PING, ping_handler());

        Self {
            config,
            secret: deps.secret,
            registry: Arc::new(Registry::new(deps.events)),
            dispatcher: Arc::new(dispatcher),
            discovery: deps.discovery,
            lifecycle: tokio::sync::Mutex::new(None),
            pending_bind: parking_lot::Mutex::new(None),
            port: parking_lot::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RegionServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The bound port, while running.
    pub fn port(&self) -> Option<u16> {
        *self.port.lock()
    }

    /// [`Registry::get_client_for`] with the configured wait.
    pub async fn client_for(&self, identity: &RackIdentity) -> Result<Client, BrokerError> {
        self.registry
            .get_client_for(identity, self.config.client_wait_timeout)
            .await
    }

    /// Bind, publish the port, and start accepting racks.
    pub async fn start(&self) -> Result<u16, BrokerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return Err(BrokerError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        *self.pending_bind.lock() = Some(cancel.clone());
        let bound = bind_first(self.config.bind_address, &self.config.ports, &cancel).await;
        self.pending_bind.lock().take();
        let listener = bound?;

        let port = listener
            .local_addr()
            .map_err(|e| BrokerError::BindFailed {
                attempts: 1,
                reason: e.to_string(),
            })?
            .port();

        self.registry.resume();
        let accept_shutdown = CancellationToken::new();
        let connections_shutdown = CancellationToken::new();
        let acceptor = Acceptor {
            secret: self.secret.clone(),
            handshake_timeout: self.config.handshake_timeout,
            context: ConnectionContext::new(Arc::clone(&self.dispatcher))
                .with_registry(&self.registry)
                .with_shutdown(connections_shutdown.clone())
                .with_config(self.config.connection.clone()),
        };
        let accept_task = tokio::spawn(acceptor.run(listener, accept_shutdown.clone()));
        *self.port.lock() = Some(port);

        if let Err(e) = self.discovery.publish(port).await {
            warn!(port, error = %e, "Failed to publish RPC port");
        }

        info!(
            name = %self.config.name,
            address = %self.config.bind_address,
            port,
            "Region RPC service started"
        );
        *lifecycle = Some(Running {
            accept_shutdown,
            connections_shutdown,
            accept_task,
        });
        Ok(port)
    }

    /// Stop accepting, reject waiters and close every connection.
    ///
    /// Returns [`BrokerError::NotRunning`] if there was nothing to stop.
    pub async fn stop(&self) -> Result<(), BrokerError> {
        let cancelled_bind = self.pending_bind.lock().take().map(|c| c.cancel()).is_some();

        let Some(running) = self.lifecycle.lock().await.take() else {
            return if cancelled_bind {
                Ok(())
            } else {
                Err(BrokerError::NotRunning)
            };
        };

        running.accept_shutdown.cancel();
        if let Err(e) = running.accept_task.await {
            warn!(error = %e, "Listener task ended abnormally");
        }
        *self.port.lock() = None;

        let connections = self.registry.begin_shutdown();
        let results = join_all(connections.iter().map(|connection| async move {
            (connection, connection.close().await)
        }))
        .await;
        for (connection, result) in results {
            if let Err(e) = result {
                warn!(
                    connection_id = %connection.id(),
                    peer = %connection.peer(),
                    error = %e,
                    "Failed to close rack connection cleanly"
                );
            }
        }

        // Connections still in their handshake were never registered.
        running.connections_shutdown.cancel();

        info!(closed = connections.len(), "Region RPC service stopped");
        Ok(())
    }
}

/// Accept loop state, moved into the listener task.
struct Acceptor {
    secret: SharedSecret,
    handshake_timeout: Duration,
    context: ConnectionContext,
}

impl Acceptor {
    async fn run(self, listener: TcpListener, shutdown: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.accept(stream, peer),
                Err(e) => {
                    warn!(error = %e, "Failed to accept rack connection");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
        debug!("Listener closed");
    }

    fn accept(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let connection = Connection::spawn(stream, peer, self.context.clone());
        info!(%peer, connection_id = %connection.id(), "Accepted rack connection");

        let secret = self.secret.clone();
        let timeout = self.handshake_timeout;
        tokio::spawn(async move {
            match authenticate_peer(&connection, &secret, timeout).await {
                Ok(()) => debug!(%peer, connection_id = %connection.id(), "Rack authenticated"),
                Err(e) => {
                    warn!(
                        %peer,
                        connection_id = %connection.id(),
                        error = %e,
                        "Rack authentication failed; dropping connection"
                    );
                    HANDSHAKE_FAILURES.with_label_values(&[e.reason_label()]).inc();
                    connection.abort();
                }
            }
        });
    }
}
