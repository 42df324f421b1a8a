//! # Ports Layer
//!
//! - **Inbound** ([`CommandHandler`]): what a connection invokes when the
//!   peer sends a request.
//! - **Outbound** ([`RackRegistrar`], [`DiscoveryPublisher`]): what the
//!   broker needs from the host application.

pub mod inbound;
pub mod outbound;

pub use inbound::{handler_fn, CommandHandler, FnHandler};
pub use outbound::{DiscoveryPublisher, RackRegistrar, RackRegistration};
