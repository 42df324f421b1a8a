//! # Shared-Secret Authentication
//!
//! Both ends of the control channel hold the same secret. A verifier proves
//! its peer knows it without the secret ever crossing the wire:
//!
//! 1. The verifier sends a random challenge message.
//! 2. The peer picks a random salt and replies with
//!    `digest = HMAC-SHA256(secret, message ++ salt)` and the salt.
//! 3. The verifier recomputes the digest and compares in constant time.
//!
//! Any failure while computing a digest counts as a failed verification.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Length of the random challenge message, in bytes.
pub const CHALLENGE_LEN: usize = 16;

/// Length of the responder's random salt, in bytes.
pub const SALT_LEN: usize = 16;

/// Length of an HMAC-SHA256 digest, in bytes.
pub const DIGEST_LEN: usize = 32;

// =============================================================================
// SECRET
// =============================================================================

/// Errors loading a shared secret.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecretError {
    /// The secret was not valid hex.
    #[error("Shared secret is not valid hex: {0}")]
    InvalidHex(String),
    /// The secret is empty or all zero bytes.
    #[error("Shared secret is empty or all zeros")]
    Insecure,
}

/// The region/rack shared secret.
///
/// `Debug` never prints the key material.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    /// Wrap raw key material.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a hex-encoded secret, as stored on disk.
    pub fn from_hex(text: &str) -> Result<Self, SecretError> {
        let bytes = hex::decode(text.trim()).map_err(|e| SecretError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Key material.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Reject secrets that offer no protection.
    pub fn validate(&self) -> Result<(), SecretError> {
        if self.0.iter().all(|b| *b == 0) {
            return Err(SecretError::Insecure);
        }
        Ok(())
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret(<{} bytes>)", self.0.len())
    }
}

// =============================================================================
// CHALLENGE / RESPONSE
// =============================================================================

/// Arguments of the `Authenticate` command: the verifier's challenge.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    /// Random challenge message.
    #[serde_as(as = "Hex")]
    pub message: Vec<u8>,
}

impl AuthenticateRequest {
    /// Draw a fresh random challenge.
    pub fn random() -> Self {
        let message: [u8; CHALLENGE_LEN] = rand::random();
        Self {
            message: message.to_vec(),
        }
    }
}

/// Result of the `Authenticate` command.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateResponse {
    /// `HMAC-SHA256(secret, message ++ salt)`.
    #[serde_as(as = "Hex")]
    pub digest: Vec<u8>,
    /// Responder-chosen random salt.
    #[serde_as(as = "Hex")]
    pub salt: Vec<u8>,
}

/// Compute `HMAC-SHA256(secret, message ++ salt)`.
///
/// Returns `None` if the MAC cannot be keyed with `secret`.
pub fn calculate_digest(secret: &SharedSecret, message: &[u8], salt: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(message);
    mac.update(salt);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Answer a peer's challenge with a freshly salted digest.
pub fn respond_to_challenge(
    secret: &SharedSecret,
    request: &AuthenticateRequest,
) -> Option<AuthenticateResponse> {
    let salt: [u8; SALT_LEN] = rand::random();
    let digest = calculate_digest(secret, &request.message, &salt)?;
    Some(AuthenticateResponse {
        digest,
        salt: salt.to_vec(),
    })
}

/// Check a peer's answer to our challenge.
///
/// Uses constant-time comparison. A MAC that cannot be keyed fails closed.
pub fn verify_response(
    secret: &SharedSecret,
    request: &AuthenticateRequest,
    response: &AuthenticateResponse,
) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(&request.message);
    mac.update(&response.salt);
    mac.verify_slice(&response.digest).is_ok()
}
