//! Error taxonomy of the broker.
//!
//! Only [`BrokerError`] crosses the broker's public lookup API. Handshake and
//! registration failures are handled where they occur and end in a closed
//! connection plus a log line.

use shared_types::{CommandError, RackIdentity};
use std::time::Duration;
use thiserror::Error;

/// Failure of an outgoing call over one connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The connection closed before a response arrived.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No response within the call timeout.
    #[error("Call {command} timed out after {timeout:?}")]
    Timeout {
        /// Command that was issued.
        command: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The peer ran the command and reported a failure.
    #[error("Remote error: {0}")]
    Remote(#[from] CommandError),

    /// The request could not be serialized.
    #[error("Failed to encode request: {0}")]
    Encode(String),

    /// Socket-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Failure of the shared-secret handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// The peer's digest did not match, or its answer was unusable.
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed {
        /// What went wrong.
        reason: String,
    },

    /// The peer did not answer the challenge in time.
    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),

    /// The challenge call failed for another reason.
    #[error("Handshake call failed: {0}")]
    Call(CallError),
}

impl HandshakeError {
    /// Label used for the handshake failure metric.
    pub fn reason_label(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed { .. } => "rejected",
            Self::Timeout(_) => "timeout",
            Self::Call(_) => "transport",
        }
    }
}

impl From<CallError> for HandshakeError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Timeout { timeout, .. } => Self::Timeout(timeout),
            CallError::Remote(remote) => Self::AuthenticationFailed {
                reason: remote.to_string(),
            },
            other => Self::Call(other),
        }
    }
}

/// Errors surfaced by the registry and service lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Nothing is connected for the requested identities, and waiting (if
    /// any) timed out.
    #[error("No connections available for {}", format_identities(.identities))]
    NoConnectionsAvailable {
        /// Identities the caller asked for; empty for "any".
        identities: Vec<RackIdentity>,
    },

    /// The broker is shutting down.
    #[error("Broker is stopping")]
    Stopping,

    /// The service is not running.
    #[error("Service is not running")]
    NotRunning,

    /// `start` was called on a running service.
    #[error("Service is already running")]
    AlreadyRunning,

    /// None of the candidate endpoints could be bound.
    #[error("Failed to bind any of {attempts} candidate ports: {reason}")]
    BindFailed {
        /// Number of endpoints tried.
        attempts: usize,
        /// Error from the last attempt.
        reason: String,
    },

    /// The connection closed before it could be registered.
    #[error("Connection closed before registration")]
    ConnectionClosed,

    /// The connection is already registered under another identity.
    #[error("Connection is already registered as {identity}")]
    AlreadyRegistered {
        /// Identity the connection is registered under.
        identity: RackIdentity,
    },
}

fn format_identities(identities: &[RackIdentity]) -> String {
    if identities.is_empty() {
        return "any rack".to_string();
    }
    identities
        .iter()
        .map(RackIdentity::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure reported by the registration port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The rack is not allowed to register.
    #[error("Registration refused: {0}")]
    Refused(String),

    /// Looking up or creating the rack record failed.
    #[error("Rack lookup failed: {0}")]
    Lookup(String),
}

/// Failure of the discovery port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to publish port {port}: {reason}")]
pub struct DiscoveryError {
    /// Port being published.
    pub port: u16,
    /// What went wrong.
    pub reason: String,
}

/// Failure of a rack connecting to a region.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The TCP connection could not be established.
    #[error("Failed to connect to {address}: {reason}")]
    Io {
        /// Region address.
        address: String,
        /// Socket error.
        reason: String,
    },

    /// The region failed our challenge.
    #[error("Region failed authentication: {0}")]
    AuthenticationFailed(HandshakeError),

    /// The region refused the registration and dropped the connection.
    #[error("Region refused registration: {0}")]
    RegistrationRefused(String),

    /// The registration call failed for another reason.
    #[error("Registration call failed: {0}")]
    Call(#[from] CallError),
}
