//! Versioned wire envelope for encrypted chat payloads
//!
//! The wire format is:
//! - the literal marker `E2EE:`
//! - followed by standard (padded) base64 of a compact JSON object
//!   `{"v":1,"alg":"AES-256-GCM","iv":"<base64 nonce>","ct":"<base64 ciphertext||tag>"}`
//!
//! Text without the marker is legacy plaintext and is not an envelope.

use crate::error::{ErrorCategory, ErrorKind, HushchatError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// Marker prefixed to every encrypted payload
pub const MARKER: &str = "E2EE:";

/// Current envelope version
pub const VERSION: u32 = 1;

/// Identifier of the only supported AEAD scheme
pub const ALGORITHM: &str = "AES-256-GCM";

/// Length of the AES-GCM nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Length of the AES-GCM authentication tag in bytes
pub const TAG_LEN: usize = 16;

/// One encrypted message as it travels over the wire.
///
/// Field order is significant: it fixes the byte layout of the serialized
/// object, which other clients may compare verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionEnvelope {
    pub v: u32,
    pub alg: String,
    pub iv: String,
    pub ct: String,
}

impl EncryptionEnvelope {
    /// Builds a current-version envelope from a nonce and `ciphertext || tag`.
    pub fn new(nonce: &[u8; NONCE_LEN], sealed: &[u8]) -> Self {
        Self {
            v: VERSION,
            alg: ALGORITHM.to_owned(),
            iv: STANDARD.encode(nonce),
            ct: STANDARD.encode(sealed),
        }
    }

    /// Decodes the `iv` field, which must be exactly [`NONCE_LEN`] bytes.
    pub fn nonce(&self) -> Result<[u8; NONCE_LEN]> {
        let raw = decode_field("iv", &self.iv)?;
        raw.as_slice().try_into().map_err(|_| {
            HushchatError::with_kind(
                ErrorCategory::User,
                ErrorKind::EnvelopeInvalid,
                format!("iv must be {} bytes, got {}", NONCE_LEN, raw.len()),
            )
        })
    }

    /// Decodes the `ct` field, which must at least hold the authentication tag.
    pub fn sealed(&self) -> Result<Vec<u8>> {
        let raw = decode_field("ct", &self.ct)?;
        if raw.len() < TAG_LEN {
            return Err(HushchatError::with_kind(
                ErrorCategory::User,
                ErrorKind::TruncatedInput,
                format!(
                    "ciphertext of {} bytes is shorter than the {}-byte tag",
                    raw.len(),
                    TAG_LEN
                ),
            ));
        }
        Ok(raw)
    }
}

/// Returns true if `text` carries the encryption marker.
pub fn is_encrypted(text: &str) -> bool {
    text.starts_with(MARKER)
}

/// Serialize an envelope into its wire string.
pub fn wrap(envelope: &EncryptionEnvelope) -> Result<String> {
    let json = serde_json::to_vec(envelope).map_err(|e| {
        HushchatError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Serialization,
            "failed to serialize envelope",
            e,
        )
    })?;
    Ok(format!("{}{}", MARKER, STANDARD.encode(json)))
}

/// Parse a wire string back into an envelope.
///
/// Only the envelope structure is validated here; field contents are
/// checked by [`EncryptionEnvelope::nonce`] and [`EncryptionEnvelope::sealed`].
pub fn unwrap(wire: &str) -> Result<EncryptionEnvelope> {
    let Some(encoded) = wire.strip_prefix(MARKER) else {
        return Err(HushchatError::with_kind(
            ErrorCategory::User,
            ErrorKind::EnvelopeInvalid,
            "input is not an encrypted envelope",
        ));
    };

    let json = STANDARD.decode(encoded).map_err(|e| {
        HushchatError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::EnvelopeDecode,
            format!("base64 decoding failed: {}", e),
            e,
        )
    })?;

    let envelope: EncryptionEnvelope = serde_json::from_slice(&json).map_err(|e| {
        HushchatError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::EnvelopeInvalid,
            format!("malformed envelope: {}", e),
            e,
        )
    })?;

    if envelope.v != VERSION {
        return Err(HushchatError::with_kind(
            ErrorCategory::User,
            ErrorKind::EnvelopeFromFuture,
            format!("unsupported envelope version {}", envelope.v),
        ));
    }
    if envelope.alg != ALGORITHM {
        return Err(HushchatError::with_kind(
            ErrorCategory::User,
            ErrorKind::EnvelopeFromFuture,
            format!("unsupported algorithm {:?}", envelope.alg),
        ));
    }

    Ok(envelope)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD.decode(value).map_err(|e| {
        HushchatError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::EnvelopeDecode,
            format!("base64 decoding of {} failed: {}", name, e),
            e,
        )
    })
}
