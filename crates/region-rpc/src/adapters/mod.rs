//! # Adapters
//!
//! Concrete implementations of the outbound ports, and the rack end of the
//! control channel.

pub mod discovery;
pub mod rack;
pub mod registrar;

pub use discovery::{FileDiscoveryPublisher, LoggingDiscoveryPublisher};
pub use rack::{RackConnector, RackSession};
pub use registrar::InMemoryRegistrar;
