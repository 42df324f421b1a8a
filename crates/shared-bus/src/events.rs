//! # Rack Events
//!
//! Notifications published by the connection registry.

use serde::{Deserialize, Serialize};
use shared_types::RackIdentity;
use uuid::Uuid;

/// A change in the set of live rack connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RackEvent {
    /// A trusted connection registered under `identity`.
    Connected {
        /// Rack the connection belongs to.
        identity: RackIdentity,
        /// Correlation id of the connection.
        connection_id: Uuid,
    },

    /// A connection for `identity` was removed from the registry.
    Disconnected {
        /// Rack the connection belonged to.
        identity: RackIdentity,
        /// Correlation id of the connection.
        connection_id: Uuid,
    },
}

impl RackEvent {
    /// The rack this event concerns.
    pub fn identity(&self) -> &RackIdentity {
        match self {
            Self::Connected { identity, .. } | Self::Disconnected { identity, .. } => identity,
        }
    }

    /// The connection this event concerns.
    pub fn connection_id(&self) -> Uuid {
        match self {
            Self::Connected { connection_id, .. } | Self::Disconnected { connection_id, .. } => {
                *connection_id
            }
        }
    }

    /// Kind of event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected { .. } => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
        }
    }
}

/// Discriminant of [`RackEvent`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// See [`RackEvent::Connected`].
    Connected,
    /// See [`RackEvent::Disconnected`].
    Disconnected,
}

/// Selects which events a subscriber receives.
///
/// Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Only these identities.
    pub identities: Vec<RackIdentity>,
    /// Only these kinds.
    pub kinds: Vec<EventKind>,
}

impl EventFilter {
    /// Match every event.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Match events for the given identities.
    #[must_use]
    pub fn identities(identities: Vec<RackIdentity>) -> Self {
        Self {
            identities,
            kinds: Vec::new(),
        }
    }

    /// Match events of the given kinds.
    #[must_use]
    pub fn kinds(kinds: Vec<EventKind>) -> Self {
        Self {
            identities: Vec::new(),
            kinds,
        }
    }

    /// Whether `event` passes this filter.
    pub fn matches(&self, event: &RackEvent) -> bool {
        let identity_ok = self.identities.is_empty() || self.identities.contains(event.identity());
        let kind_ok = self.kinds.is_empty() || self.kinds.contains(&event.kind());
        identity_ok && kind_ok
    }
}
