//! Test doubles and in-process connection pairs.
//!
//! Available to this crate's tests and, with the `test-utils` feature, to
//! downstream suites.

use crate::domain::{DiscoveryError, RegistrationError};
use crate::ports::{handler_fn, DiscoveryPublisher, RackRegistrar, RackRegistration};
use crate::service::{Connection, ConnectionContext, Dispatcher, Registry};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use shared_types::{RackIdentity, RegistrationRequest, SharedSecret};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;

/// Buffer size of in-process duplex pipes.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Secret shared by test regions and racks.
pub fn test_secret() -> SharedSecret {
    SharedSecret::new(b"region-rack-test-secret".to_vec())
}

/// A distinct loopback address per call, for connections without a socket.
pub fn fake_peer() -> SocketAddr {
    static NEXT_PORT: AtomicU16 = AtomicU16::new(40000);
    SocketAddr::new(
        Ipv4Addr::LOCALHOST.into(),
        NEXT_PORT.fetch_add(1, Ordering::Relaxed),
    )
}

/// Rack-side commands: each cacheable command reports how often the rack
/// actually ran it, so cache hits are observable.
pub fn counting_rack_handlers() -> (Dispatcher, Arc<AtomicU64>) {
    let runs = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&runs);
    let dispatcher = Dispatcher::new()
        .with(
            "DescribePowerTypes",
            handler_fn(move |_| {
                let run = counter.fetch_add(1, Ordering::SeqCst) + 1;
                std::future::ready(Ok(json!({ "power_types": ["ipmi", "redfish"], "run": run })))
            }),
        )
        .with(
            "PowerQuery",
            handler_fn(|arguments| std::future::ready(Ok(json!({ "echo": arguments })))),
        );
    (dispatcher, runs)
}

/// Two connections joined by an in-memory pipe.
pub struct ConnectionPair {
    /// The end wired to `local`'s context (usually the region).
    pub local: Arc<Connection>,
    /// The far end (usually the rack).
    pub remote: Arc<Connection>,
}

/// Join two contexts with a duplex pipe. Neither end is authenticated.
pub fn connection_pair(local: ConnectionContext, remote: ConnectionContext) -> ConnectionPair {
    let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
    ConnectionPair {
        local: Connection::spawn(a, fake_peer(), local),
        remote: Connection::spawn(b, fake_peer(), remote),
    }
}

/// A pair whose `local` end belongs to `registry`, both ends already trusted.
///
/// The local end is not registered; callers do that explicitly.
pub fn trusted_pair(registry: &Arc<Registry>, rack_handlers: Dispatcher) -> ConnectionPair {
    let pair = connection_pair(
        ConnectionContext::new(Arc::new(Dispatcher::new())).with_registry(registry),
        ConnectionContext::new(Arc::new(rack_handlers)),
    );
    pair.local.mark_trusted();
    pair.remote.mark_trusted();
    pair
}

/// Records every published port.
#[derive(Debug, Default)]
pub struct RecordingDiscovery {
    ports: Mutex<Vec<u16>>,
}

impl RecordingDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ports(&self) -> Vec<u16> {
        self.ports.lock().clone()
    }
}

#[async_trait]
impl DiscoveryPublisher for RecordingDiscovery {
    async fn publish(&self, port: u16) -> Result<(), DiscoveryError> {
        self.ports.lock().push(port);
        Ok(())
    }
}

/// Registrar whose lookup always fails.
#[derive(Debug, Clone)]
pub struct FailingRegistrar {
    reason: String,
}

impl FailingRegistrar {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RackRegistrar for FailingRegistrar {
    async fn register(
        &self,
        _request: &RegistrationRequest,
        _peer: SocketAddr,
    ) -> Result<RackRegistration, RegistrationError> {
        Err(RegistrationError::Lookup(self.reason.clone()))
    }
}

/// Registrar that uses the declared system id verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoRegistrar;

#[async_trait]
impl RackRegistrar for EchoRegistrar {
    async fn register(
        &self,
        request: &RegistrationRequest,
        _peer: SocketAddr,
    ) -> Result<RackRegistration, RegistrationError> {
        Ok(RackRegistration {
            identity: RackIdentity::new(request.system_id.clone()),
            uuid: None,
        })
    }
}
