//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the host application implements for the broker.

use crate::domain::{DiscoveryError, RegistrationError};
use async_trait::async_trait;
use shared_types::{RackIdentity, RegistrationRequest};
use std::net::SocketAddr;

/// Outcome of a successful registration lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RackRegistration {
    /// Canonical identity the connection is registered under.
    pub identity: RackIdentity,
    /// Deployment-wide region UUID echoed back to the rack.
    pub uuid: Option<String>,
}

/// Looks up (or creates) the record of a rack that just authenticated.
///
/// Called once per trusted connection. Any error drops the connection.
#[async_trait]
pub trait RackRegistrar: Send + Sync {
    async fn register(
        &self,
        request: &RegistrationRequest,
        peer: SocketAddr,
    ) -> Result<RackRegistration, RegistrationError>;
}

/// Advertises the port the broker bound, e.g. for racks to discover.
#[async_trait]
pub trait DiscoveryPublisher: Send + Sync {
    async fn publish(&self, port: u16) -> Result<(), DiscoveryError>;
}
