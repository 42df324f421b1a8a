//! # Frame Envelope
//!
//! The single message type carried by the length-delimited transport.
//!
//! ## Properties
//!
//! - **Symmetric**: either end may send requests once the socket is up.
//! - **Multiplexed**: many requests may be outstanding; each response echoes
//!   the id of the request it answers.
//! - **Opaque**: `arguments` and successful results are plain JSON.

use crate::commands::Arguments;
use crate::errors::CommandError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Per-connection request correlation id.
pub type RequestId = u64;

/// Errors encoding or decoding a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The bytes were not a valid frame.
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Invoke `command` on the peer.
    Request {
        /// Correlation id, unique among this sender's outstanding requests.
        id: RequestId,
        /// Command name.
        command: String,
        /// Argument bag.
        #[serde(default)]
        arguments: Arguments,
    },
    /// Outcome of an earlier request.
    Response {
        /// Id of the request being answered.
        id: RequestId,
        /// Result payload or typed failure.
        result: Result<Value, CommandError>,
    },
}

impl Frame {
    /// Build a request frame.
    pub fn request(id: RequestId, command: impl Into<String>, arguments: Arguments) -> Self {
        Self::Request {
            id,
            command: command.into(),
            arguments,
        }
    }

    /// Build a response frame.
    pub fn response(id: RequestId, result: Result<Value, CommandError>) -> Self {
        Self::Response { id, result }
    }

    /// Correlation id of this frame.
    pub fn id(&self) -> RequestId {
        match self {
            Self::Request { id, .. } | Self::Response { id, .. } => *id,
        }
    }

    /// Serialize for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a frame received from the wire.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
