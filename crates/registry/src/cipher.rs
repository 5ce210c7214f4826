//! Cipher executor: ticket blob confidentiality and integrity.
//!
//! Serialized tickets are encrypted and signed before they leave process
//! memory for a shared store or the wire. The order is fixed: **sign last
//! on encode, verify first on decode**. A tampered or truncated blob fails
//! closed with [`RegistryError::DecryptionFailure`] — no partial or
//! garbage plaintext is ever returned.
//!
//! Two implementations:
//!
//! - [`AeadTicketCipher`] — AES-256-GCM encryption, then HMAC-SHA-256 over
//!   `nonce || ciphertext`. Both keys are external configuration inputs.
//! - [`NoOpTicketCipher`] — pass-through, for deployments where the backing
//!   store is itself access-controlled and encrypted at rest. Selected per
//!   backend, not globally.
//!
//! # Blob layout (`AeadTicketCipher`)
//!
//! ```text
//! ┌──────────┬───────────────────────┬──────────────┐
//! │ nonce 12 │ ciphertext + GCM tag  │ HMAC tag 32  │
//! └──────────┴───────────────────────┴──────────────┘
//! ```

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{ConfigError, RegistryError, RegistryResult};

type HmacSha256 = Hmac<Sha256>;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;
/// HMAC-SHA-256 tag length in bytes.
const MAC_LEN: usize = 32;
/// GCM authentication tag length in bytes (part of the ciphertext).
const GCM_TAG_LEN: usize = 16;

/// Encrypts and signs serialized ticket blobs.
///
/// Implementations are CPU-bound and synchronous; they are invoked from
/// async contexts without suspension.
pub trait TicketCipher: Send + Sync {
    /// Encrypts `plaintext` and signs the result (signing applied last).
    ///
    /// # Errors
    ///
    /// [`RegistryError::Internal`] on cipher failure (never leaks plaintext).
    fn encode(&self, plaintext: &[u8]) -> RegistryResult<Vec<u8>>;

    /// Verifies `blob`'s signature first, then decrypts.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DecryptionFailure`] on any verification or
    /// decryption failure, including truncation.
    fn decode(&self, blob: &[u8]) -> RegistryResult<Vec<u8>>;
}

/// Pass-through cipher for trusted storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTicketCipher;

impl TicketCipher for NoOpTicketCipher {
    fn encode(&self, plaintext: &[u8]) -> RegistryResult<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decode(&self, blob: &[u8]) -> RegistryResult<Vec<u8>> {
        Ok(blob.to_vec())
    }
}

/// Key material for [`AeadTicketCipher`].
///
/// Keys are externally provisioned (this subsystem never generates them)
/// and zeroed from memory on drop.
pub struct CipherKeys {
    encryption_key: Zeroizing<[u8; 32]>,
    signing_key: Zeroizing<[u8; 32]>,
}

impl CipherKeys {
    /// Builds key material from raw 32-byte keys.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when either slice is not exactly 32 bytes.
    pub fn from_slices(encryption_key: &[u8], signing_key: &[u8]) -> Result<Self, ConfigError> {
        let encryption_key: [u8; 32] = encryption_key.try_into().map_err(|_| {
            ConfigError::Invalid {
                field: "encryption_key",
                reason: format!("expected 32 bytes, got {}", encryption_key.len()),
            }
        })?;
        let signing_key: [u8; 32] =
            signing_key.try_into().map_err(|_| ConfigError::Invalid {
                field: "signing_key",
                reason: format!("expected 32 bytes, got {}", signing_key.len()),
            })?;
        Ok(Self {
            encryption_key: Zeroizing::new(encryption_key),
            signing_key: Zeroizing::new(signing_key),
        })
    }
}

/// AES-256-GCM + HMAC-SHA-256 cipher executor (encrypt, then sign).
pub struct AeadTicketCipher {
    cipher: Aes256Gcm,
    signing_key: Zeroizing<[u8; 32]>,
}

impl AeadTicketCipher {
    /// Creates the cipher from provisioned key material.
    #[must_use]
    pub fn new(keys: CipherKeys) -> Self {
        let key = aes_gcm::Key::<Aes256Gcm>::from(*keys.encryption_key);
        Self { cipher: Aes256Gcm::new(&key), signing_key: keys.signing_key }
    }

    fn mac(&self, body: &[u8]) -> HmacSha256 {
        // `KeyInit` is in scope for AES-GCM, so the `Mac` constructor must
        // be path-qualified.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.signing_key.as_slice())
            .expect("HMAC accepts any key length");
        mac.update(body);
        mac
    }
}

impl TicketCipher for AeadTicketCipher {
    fn encode(&self, plaintext: &[u8]) -> RegistryResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| RegistryError::internal("ticket encryption failed"))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len() + MAC_LEN);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        // Sign last: the MAC covers everything written so far.
        let tag = self.mac(&blob).finalize().into_bytes();
        blob.extend_from_slice(&tag);
        Ok(blob)
    }

    fn decode(&self, blob: &[u8]) -> RegistryResult<Vec<u8>> {
        // Verify first. Length check before any slicing; constant-time MAC
        // comparison via `verify_slice`.
        if blob.len() < NONCE_LEN + GCM_TAG_LEN + MAC_LEN {
            return Err(RegistryError::DecryptionFailure);
        }
        let (body, tag) = blob.split_at(blob.len() - MAC_LEN);
        self.mac(body).verify_slice(tag).map_err(|_| RegistryError::DecryptionFailure)?;

        let (nonce_bytes, ciphertext) = body.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher.decrypt(nonce, ciphertext).map_err(|_| RegistryError::DecryptionFailure)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cipher() -> AeadTicketCipher {
        let keys = CipherKeys::from_slices(&[0x42; 32], &[0x17; 32]).unwrap();
        AeadTicketCipher::new(keys)
    }

    #[test]
    fn round_trip() {
        let c = cipher();
        let plaintext = br#"{"id":"TGT-1-abc","principal_id":"alice"}"#;
        let blob = c.encode(plaintext).unwrap();
        assert_ne!(&blob[..], &plaintext[..]);
        assert_eq!(c.decode(&blob).unwrap(), plaintext);
    }

    #[test]
    fn random_nonce_makes_blobs_distinct() {
        let c = cipher();
        let a = c.encode(b"same plaintext").unwrap();
        let b = c.encode(b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn every_flipped_byte_fails_closed() {
        let c = cipher();
        let blob = c.encode(b"short ticket payload").unwrap();

        for i in 0..blob.len() {
            let mut tampered = blob.clone();
            tampered[i] ^= 0x01;
            let result = c.decode(&tampered);
            assert!(
                matches!(result, Err(RegistryError::DecryptionFailure)),
                "flipping byte {i} should fail verification",
            );
        }
    }

    #[test]
    fn truncated_blob_fails_closed() {
        let c = cipher();
        let blob = c.encode(b"payload").unwrap();

        for len in 0..blob.len() {
            let result = c.decode(&blob[..len]);
            assert!(
                matches!(result, Err(RegistryError::DecryptionFailure)),
                "truncation to {len} bytes should fail verification",
            );
        }
    }

    #[test]
    fn wrong_signing_key_fails_verification() {
        let blob = cipher().encode(b"payload").unwrap();
        let other =
            AeadTicketCipher::new(CipherKeys::from_slices(&[0x42; 32], &[0x99; 32]).unwrap());
        assert!(matches!(other.decode(&blob), Err(RegistryError::DecryptionFailure)));
    }

    #[test]
    fn noop_is_identity() {
        let c = NoOpTicketCipher;
        let blob = c.encode(b"plain").unwrap();
        assert_eq!(blob, b"plain");
        assert_eq!(c.decode(&blob).unwrap(), b"plain");
    }

    #[test]
    fn keys_reject_wrong_length() {
        // `.err()` first: key material carries no `Debug` impl.
        let err = CipherKeys::from_slices(&[0u8; 16], &[0u8; 32]).err().unwrap();
        assert!(matches!(err, ConfigError::Invalid { field: "encryption_key", .. }));
        let err = CipherKeys::from_slices(&[0u8; 32], &[0u8; 31]).err().unwrap();
        assert!(matches!(err, ConfigError::Invalid { field: "signing_key", .. }));
    }
}
