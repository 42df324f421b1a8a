//! # Region RPC Broker
//!
//! The region end of the region/rack control channel. Rack controllers dial
//! in over TCP, prove knowledge of the shared secret, register under their
//! system id and from then on take commands from the region (and send
//! commands back) over the same multiplexed connection.
//!
//! ## Control Flow
//!
//! ```text
//! Listener ──accept──▶ Connection ──handshake──▶ Trusted
//!                                                   │ RegisterRackController
//!                                                   ▼
//! application ──get_client_for(id)──▶ Registry ◀── register(id, conn)
//!      │                                 │
//!      └───────────── Client ◀───────────┘
//! ```
//!
//! The registry never inspects call payloads; data flows only through
//! [`Connection`](service::Connection) and [`Client`](service::Client).
//!
//! ## Architecture
//!
//! - **Domain Layer:** states, waiter table, call cache, errors
//! - **Ports Layer:** command handlers, registrar and discovery traits
//! - **Transport Layer:** length-delimited framing, endpoint binding
//! - **Service Layer:** connections, handshake, registry, lifecycle
//! - **Adapters Layer:** rack connector, in-memory registrar, publishers
//!
//! ## Example
//!
//! ```rust,ignore
//! let service = RegionService::new(RegionServiceConfig::default(), RegionDependencies {
//!     secret,
//!     registrar: Arc::new(InMemoryRegistrar::new()),
//!     discovery: Arc::new(LoggingDiscoveryPublisher),
//!     events: Arc::new(InMemoryEventBus::new()),
//!     handlers: Dispatcher::new(),
//! });
//! let port = service.start().await?;
//!
//! let client = service.registry().get_client_for(&"abc123".into(), Duration::from_secs(30)).await?;
//! let power_types = client.call("DescribePowerTypes", Arguments::new()).await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;
pub mod transport;

/// Test doubles.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use adapters::{InMemoryRegistrar, RackConnector, RackSession};
pub use domain::{
    BrokerError, CallError, ConnectError, ConnectionInfo, ConnectionState, HandshakeError,
    RegistrationError,
};
pub use ports::{handler_fn, CommandHandler, DiscoveryPublisher, RackRegistrar, RackRegistration};
pub use service::{
    Client, Connection, ConnectionConfig, Dispatcher, RegionDependencies, RegionService,
    RegionServiceConfig, Registry,
};
