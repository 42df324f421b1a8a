//! # Shared-Secret Handshake
//!
//! The verifying side sends a random challenge through the `Authenticate`
//! command. The peer answers with a fresh salt and
//! `HMAC(secret, challenge ++ salt)`, which the verifier recomputes and
//! compares in constant time.
//!
//! The region verifies every rack it accepts; a rack verifies the region
//! before it registers.

use crate::domain::{CallError, HandshakeError};
use crate::ports::CommandHandler;
use crate::service::Connection;
use async_trait::async_trait;
use serde_json::Value;
use shared_types::{
    arguments_from, respond_to_challenge, verify_response, Arguments, AuthenticateRequest,
    AuthenticateResponse, CommandError, SharedSecret, AUTHENTICATE,
};
use std::sync::Arc;
use std::time::Duration;

/// Default bound on the peer's answer to our challenge.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Answers the peer's `Authenticate` challenge.
pub struct AuthenticateHandler {
    secret: SharedSecret,
}

impl AuthenticateHandler {
    pub fn new(secret: SharedSecret) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl CommandHandler for AuthenticateHandler {
    async fn handle(
        &self,
        _connection: &Arc<Connection>,
        arguments: Arguments,
    ) -> Result<Value, CommandError> {
        let request: AuthenticateRequest = serde_json::from_value(Value::Object(arguments))
            .map_err(|e| CommandError::InvalidArguments(e.to_string()))?;

        let response = respond_to_challenge(&self.secret, &request).ok_or_else(|| {
            CommandError::failed("AuthenticationUnavailable", "shared secret is unusable")
        })?;

        serde_json::to_value(response)
            .map_err(|e| CommandError::failed("EncodingFailed", e.to_string()))
    }
}

/// Challenge the peer of `connection` and settle its handshake state.
///
/// Moves the connection to `Trusted` on success and `Rejected` otherwise.
/// Closing a rejected connection is left to the caller.
pub async fn authenticate_peer(
    connection: &Arc<Connection>,
    secret: &SharedSecret,
    timeout: Duration,
) -> Result<(), HandshakeError> {
    match challenge_peer(connection, secret, timeout).await {
        Ok(()) if connection.mark_trusted() => Ok(()),
        Ok(()) => Err(HandshakeError::Call(CallError::ConnectionClosed)),
        Err(e) => {
            connection.mark_rejected();
            Err(e)
        }
    }
}

async fn challenge_peer(
    connection: &Connection,
    secret: &SharedSecret,
    timeout: Duration,
) -> Result<(), HandshakeError> {
    let challenge = AuthenticateRequest::random();
    let arguments = serde_json::to_value(&challenge)
        .map(arguments_from)
        .map_err(|e| HandshakeError::Call(CallError::Encode(e.to_string())))?;

    let answer = connection
        .call_with_timeout(AUTHENTICATE, arguments, timeout)
        .await?;

    let response: AuthenticateResponse =
        serde_json::from_value(answer).map_err(|e| HandshakeError::AuthenticationFailed {
            reason: format!("malformed answer: {e}"),
        })?;

    if verify_response(secret, &challenge, &response) {
        Ok(())
    } else {
        Err(HandshakeError::AuthenticationFailed {
            reason: "digest mismatch".to_string(),
        })
    }
}
