//! # Domain Layer
//!
//! Pure broker vocabulary: connection states, the per-connection call cache,
//! waiter bookkeeping and the error taxonomy. Nothing here performs I/O.

pub mod cache;
pub mod errors;
pub mod state;
pub mod waiter;

pub use cache::CallCache;
pub use errors::{
    BrokerError, CallError, ConnectError, DiscoveryError, HandshakeError, RegistrationError,
};
pub use state::{ConnectionInfo, ConnectionState};
pub use waiter::{WaiterId, WaiterTable};
