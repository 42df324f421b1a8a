//! # Domain Entities
//!
//! Identities and registration payloads exchanged during the handshake.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier of a rack controller (its system id).
///
/// Unique per rack, not per connection: several live connections may share
/// one identity when redundant rack processes serve the same cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RackIdentity(String);

impl RackIdentity {
    /// Wrap a system id.
    pub fn new(system_id: impl Into<String>) -> Self {
        Self(system_id.into())
    }

    /// The raw system id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when no system id has been assigned yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RackIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RackIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Feature flags a peer may declare or acknowledge during registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Peer understands responses carrying a `version` field.
    VersionedResponses,
    /// Peer takes over interface discovery through network beacons.
    Beacons,
}

/// Arguments of the `RegisterRackController` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RegistrationRequest {
    /// Previously assigned system id; empty on first registration.
    #[serde(default)]
    pub system_id: String,
    /// Hostname of the rack controller.
    pub hostname: String,
    /// Declared listening interfaces, keyed by interface name.
    #[serde(default)]
    pub interfaces: BTreeMap<String, serde_json::Value>,
    /// URL the rack uses to reach the region, if configured.
    #[serde(default)]
    pub url: Option<String>,
    /// Whether the rack handles interface discovery through beacons.
    #[serde(default)]
    pub beacon_support: bool,
    /// Running software version of the rack; `None` for legacy racks.
    #[serde(default)]
    pub version: Option<String>,
}

impl RegistrationRequest {
    /// Create a registration request for a rack with no interfaces declared.
    pub fn new(system_id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            system_id: system_id.into(),
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    /// Capabilities the rack declared in this request.
    pub fn declared_capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.version.is_some() {
            caps.push(Capability::VersionedResponses);
        }
        if self.beacon_support {
            caps.push(Capability::Beacons);
        }
        caps
    }
}

/// Result of the `RegisterRackController` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// Canonical system id the rack must use from now on.
    pub system_id: String,
    /// Deployment-wide UUID of the region, if known.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Region software version; only sent to racks that declared a version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Capabilities the region acknowledges for this connection.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}
