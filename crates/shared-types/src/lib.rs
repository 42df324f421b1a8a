//! # Shared Types Crate
//!
//! This crate contains the vocabulary both ends of the region <-> rack
//! control channel agree on.
//!
//! ## Design Principles
//!
//! - **Opaque Payloads**: The broker never inspects call payloads. Arguments
//!   travel as a JSON object, results as a JSON value, failures as a typed
//!   [`CommandError`].
//! - **One Frame Type**: Every message on the wire is a [`Frame`], either a
//!   request or the response correlated to it by request id.
//! - **Shared-Secret Trust**: Peers prove knowledge of the shared secret with
//!   an HMAC challenge/response (see [`security`]).

pub mod commands;
pub mod entities;
pub mod envelope;
pub mod errors;
pub mod security;

pub use commands::*;
pub use entities::*;
pub use envelope::{Frame, FrameError, RequestId};
pub use errors::*;
pub use security::*;
