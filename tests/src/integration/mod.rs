//! Loopback integration flows.

pub mod flows;
pub mod lifecycle;
pub mod security;
