//! # Service Layer
//!
//! The moving parts of the broker:
//!
//! - [`Connection`]: one framed duplex channel with request multiplexing
//! - [`Dispatcher`]: name to handler table with the handshake gate
//! - [`handshake`]: shared-secret challenge and response
//! - [`Client`]: cached call proxy bound to one connection
//! - [`Registry`]: identity to connections, waiters and events
//! - [`RegionService`]: listener and lifecycle

mod client;
mod connection;
mod dispatcher;
pub mod handshake;
mod region;
mod registration;
mod registry;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig, ConnectionContext, DEFAULT_CALL_TIMEOUT};
pub use dispatcher::Dispatcher;
pub use handshake::{authenticate_peer, AuthenticateHandler, DEFAULT_HANDSHAKE_TIMEOUT};
pub use region::{
    RegionDependencies, RegionService, RegionServiceConfig, DEFAULT_CLIENT_WAIT_TIMEOUT,
    DEFAULT_PORTS,
};
pub use registration::{
    identify_handler, ping_handler, RegisterRackControllerHandler, SUPPORTED_CAPABILITIES,
};
pub use registry::Registry;
