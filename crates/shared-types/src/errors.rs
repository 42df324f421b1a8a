//! # Error Types
//!
//! Typed command failures. These cross the wire inside a response frame, so
//! they are serializable and carry only owned strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a remote command, as reported by the peer that ran it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum CommandError {
    /// No responder is registered under this command name.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// The command requires a trusted connection.
    #[error("Command {0} requires an authenticated connection")]
    Unauthenticated(String),

    /// Arguments could not be decoded into the command's parameters.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Registration was refused; the connection will be dropped.
    #[error("Cannot register rack controller: {0}")]
    CannotRegister(String),

    /// The responder ran and failed.
    #[error("{kind}: {message}")]
    Failed {
        /// Error class, e.g. `NoSuchNode` or `PowerActionFail`.
        kind: String,
        /// Human-readable description.
        message: String,
    },
}

impl CommandError {
    /// Generic responder failure.
    pub fn failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Whether the sender of this error closes the connection after replying.
    pub fn drops_connection(&self) -> bool {
        matches!(self, Self::CannotRegister(_))
    }
}
