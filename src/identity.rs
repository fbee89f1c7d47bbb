//! Pseudonymous visitor identities
//!
//! A visitor is never stored by network address. Instead the address is run
//! through HMAC-SHA256 keyed with a server-held secret and the first 16 bytes
//! of the digest are encoded as URL-safe base64 without padding. The result is
//! a fixed 22-character token that is stable for a given (address, secret)
//! pair and changes whenever either side changes.

use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

/// Number of digest bytes kept for the identity token
pub const VISITOR_ID_BYTES: usize = 16;

/// Length of the encoded token (16 bytes, unpadded base64)
pub const VISITOR_ID_LEN: usize = 22;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("address hashing secret is missing or blank")]
    MissingSecret,
    #[error("failed to create HMAC: {0}")]
    InvalidKey(String),
}

/// Opaque visitor token used as a lookup key for view and like records
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorId(String);

impl VisitorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VisitorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives visitor identities from raw addresses
///
/// Built once at startup and shared behind an `Arc`.
pub struct IdentityHasher {
    mac: Hmac<Sha256>,
}

impl IdentityHasher {
    pub fn new(secret: &str) -> Result<Self, IdentityError> {
        if secret.trim().is_empty() {
            return Err(IdentityError::MissingSecret);
        }

        let mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|e| IdentityError::InvalidKey(e.to_string()))?;

        Ok(Self { mac })
    }

    /// Derive the identity token for a source address
    pub fn derive(&self, address: &str) -> VisitorId {
        let mut mac = self.mac.clone();
        mac.update(address.as_bytes());
        let digest = mac.finalize().into_bytes();

        VisitorId(BASE64_URL_SAFE_NO_PAD.encode(&digest[..VISITOR_ID_BYTES]))
    }
}

impl fmt::Debug for IdentityHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityHasher")
            .field("mac", &"<redacted>")
            .finish()
    }
}
