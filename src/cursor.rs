use anyhow::{anyhow, Result};
use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Signs and verifies opaque keyset cursors for post listings
pub struct CursorSigner {
    key: Vec<u8>,
}

/// Cursor data for pagination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorData {
    pub created_at: i64,
    pub id: i64,
}

impl CursorSigner {
    /// Create a signer from a configured secret.
    /// If secret is None, generates a random key (cursors won't survive restarts)
    pub fn new(secret: Option<&str>) -> Self {
        let key = match secret {
            Some(s) if !s.is_empty() => s.as_bytes().to_vec(),
            _ => {
                tracing::warn!("CURSOR_HMAC_SECRET not set, using a random key for this process");
                rand::random::<[u8; 32]>().to_vec()
            }
        };

        Self { key }
    }

    fn mac(&self) -> Result<Hmac<Sha256>> {
        Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| anyhow!("Failed to create HMAC: {}", e))
    }

    /// Create a signed cursor from data
    pub fn create(&self, data: &CursorData) -> Result<String> {
        let json = serde_json::to_string(data)?;
        let payload = BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes());

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature_b64 = BASE64_URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", payload, signature_b64))
    }

    /// Verify and decode a cursor
    pub fn verify(&self, cursor: &str) -> Result<CursorData> {
        let (payload, signature_b64) = match cursor.split('.').collect::<Vec<_>>()[..] {
            [payload, signature] => (payload, signature),
            _ => return Err(anyhow!("Invalid cursor format")),
        };

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let expected_bytes = mac.finalize().into_bytes();

        let provided_bytes = BASE64_URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| anyhow!("Invalid cursor signature encoding"))?;

        // Constant-time comparison
        if !bool::from(expected_bytes.ct_eq(&provided_bytes[..])) {
            return Err(anyhow!("Cursor signature verification failed"));
        }

        let json_bytes = BASE64_URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| anyhow!("Invalid cursor payload encoding"))?;
        let data: CursorData =
            serde_json::from_slice(&json_bytes).map_err(|_| anyhow!("Invalid cursor data"))?;

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> CursorSigner {
        CursorSigner::new(Some("test_secret_key_for_hmac_signing"))
    }

    #[test]
    fn test_cursor_create_and_verify() {
        let signer = signer();
        let data = CursorData {
            created_at: 1234567890,
            id: 42,
        };

        let cursor = signer.create(&data).unwrap();
        let verified = signer.verify(&cursor).unwrap();

        assert_eq!(verified, data);
    }

    #[test]
    fn test_cursor_tampering_detection() {
        let signer = signer();
        let data = CursorData {
            created_at: 1234567890,
            id: 42,
        };

        let cursor = signer.create(&data).unwrap();
        let (payload, _) = cursor.split_once('.').unwrap();
        let tampered = format!("{}.invalid_signature", payload);
        assert!(signer.verify(&tampered).is_err());

        // Swapping in a payload signed for different data must also fail
        let other = signer
            .create(&CursorData {
                created_at: 1,
                id: 1,
            })
            .unwrap();
        let (_, other_sig) = other.split_once('.').unwrap();
        assert!(signer.verify(&format!("{}.{}", payload, other_sig)).is_err());
    }

    #[test]
    fn test_cursor_rejected_by_other_key() {
        let data = CursorData {
            created_at: 10,
            id: 2,
        };
        let cursor = signer().create(&data).unwrap();

        let other = CursorSigner::new(Some("a different secret"));
        assert!(other.verify(&cursor).is_err());
    }

    #[test]
    fn test_random_key_round_trip() {
        let signer = CursorSigner::new(None);
        let data = CursorData {
            created_at: 7,
            id: 3,
        };

        let cursor = signer.create(&data).unwrap();
        assert_eq!(signer.verify(&cursor).unwrap(), data);
    }

    #[test]
    fn test_cursor_invalid_format() {
        let signer = signer();
        assert!(signer.verify("invalid").is_err());
        assert!(signer.verify("invalid.format.extra").is_err());
        assert!(signer.verify("").is_err());
    }
}
