//! Connection handshake state machine.
//!
//! ```text
//! Connecting ──▶ Handshaking ──▶ Trusted ──▶ Closed
//!                     │                        ▲
//!                     └────────▶ Rejected ─────┘
//! ```
//!
//! Any state may move straight to `Closed` when the socket goes away.

use serde::Serialize;
use shared_types::RackIdentity;
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

/// Lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Socket accepted, I/O task not yet running.
    Connecting,
    /// Waiting for the peer to answer our challenge.
    Handshaking,
    /// Peer authenticated.
    Trusted,
    /// Peer failed authentication; the socket is being closed.
    Rejected,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Handshaking)
                | (Handshaking, Trusted)
                | (Handshaking, Rejected)
                | (Connecting | Handshaking | Trusted | Rejected, Closed)
        )
    }

    /// True once the handshake outcome is known.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Trusted | Self::Rejected | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Trusted => "trusted",
            Self::Rejected => "rejected",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Point-in-time description of a connection, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Correlation id.
    pub id: Uuid,
    /// Rack identity, once registered.
    pub identity: Option<RackIdentity>,
    /// Remote address.
    pub peer: SocketAddr,
    /// Current state.
    pub state: ConnectionState,
}
