//! Channel transport encryption using a passphrase-derived AES-256-GCM key
//!
//! Outbound text is sealed under the channel key with a fresh random
//! 96-bit nonce and wrapped into an [`envelope`](crate::envelope).
//! Inbound text goes the other way. Decryption is fail-soft: a message
//! that cannot be opened turns into [`DECRYPT_FAILED_PLACEHOLDER`] so the
//! rest of the stream keeps rendering.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::envelope::{self, EncryptionEnvelope, NONCE_LEN};
use crate::error::{ErrorCategory, ErrorKind, HushchatError, Result};
use crate::kdf::{self, KeyCache, SymmetricKey};

/// Shown in place of a message that could not be decrypted
pub const DECRYPT_FAILED_PLACEHOLDER: &str = "[unable to decrypt message]";

/// Encrypts and decrypts chat text for a single channel.
#[derive(Debug, Clone)]
pub struct TransportEncryptor {
    key: SymmetricKey,
}

impl TransportEncryptor {
    pub fn new(key: SymmetricKey) -> Self {
        Self { key }
    }

    /// Derives the channel key directly. Prefer [`Self::from_cache`] when
    /// the same channel is opened more than once per session.
    pub fn for_channel(passphrase: &[u8], channel: &str, iterations: u32) -> Self {
        Self::new(kdf::derive_key(passphrase, channel, iterations))
    }

    pub fn from_cache(cache: &KeyCache, passphrase: &[u8], channel: &str, iterations: u32) -> Self {
        Self::new(cache.get_or_derive(passphrase, channel, iterations))
    }

    /// Encrypt `plaintext` into an `E2EE:` wire string under a random nonce.
    ///
    /// Only fails if AES-GCM rejects the input, which requires a message
    /// beyond the cipher's length limit.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        self.encrypt_with_nonce(plaintext, &nonce)
    }

    /// Encrypt `plaintext` under a caller-provided nonce.
    ///
    /// This function is ONLY for producing interoperability vectors.
    /// Reusing a nonce under the same key destroys confidentiality; always
    /// use [`Self::encrypt`] for real traffic.
    pub fn encrypt_with_nonce(&self, plaintext: &str, nonce: &[u8; NONCE_LEN]) -> Result<String> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));

        // aes-gcm appends the 16-byte tag, giving ciphertext || tag.
        let sealed = cipher
            .encrypt(Nonce::from_slice(nonce), plaintext.as_bytes())
            .map_err(|e| {
                HushchatError::with_kind(
                    ErrorCategory::Internal,
                    ErrorKind::SealFailure,
                    format!("encryption failed: {}", e),
                )
            })?;

        envelope::wrap(&EncryptionEnvelope::new(nonce, &sealed))
    }

    /// Strict decryption with typed errors.
    ///
    /// Text without the marker is returned unchanged.
    pub fn try_decrypt(&self, wire: &str) -> Result<String> {
        if !envelope::is_encrypted(wire) {
            return Ok(wire.to_owned());
        }

        let envelope = envelope::unwrap(wire)?;
        let nonce = envelope.nonce()?;
        let sealed = envelope.sealed()?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| {
                HushchatError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::AuthenticationFailed,
                    "corrupt input, tampered-with data, or wrong passphrase",
                )
            })?;

        String::from_utf8(plaintext).map_err(|e| {
            HushchatError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::EnvelopeInvalid,
                "decrypted payload is not valid UTF-8",
                e,
            )
        })
    }

    /// Decrypt a wire string; total over all inputs.
    ///
    /// Legacy plaintext passes through unchanged. Anything carrying the
    /// marker that cannot be opened yields [`DECRYPT_FAILED_PLACEHOLDER`].
    pub fn decrypt(&self, wire: &str) -> String {
        match self.try_decrypt(wire) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                tracing::debug!(kind = ?err.kind, error = %err, "replacing undecryptable message");
                DECRYPT_FAILED_PLACEHOLDER.to_owned()
            }
        }
    }
}
