//! # Transport Layer
//!
//! Length-prefixed framing over any byte stream, and binding of the first
//! available listening endpoint.

pub mod codec;
pub mod listener;

pub use codec::{framed_transport, Transport, HEADER_LEN, MAX_FRAME_LEN};
pub use listener::bind_first;
