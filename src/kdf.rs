//! Passphrase-to-key derivation for channel transport keys
//!
//! Every participant who knows the group passphrase and the channel name
//! derives the same 256-bit key, with no key exchange:
//!
//! - PRF: HMAC-SHA-256
//! - construction: PBKDF2
//! - salt: `"hc:"` followed by the raw channel-name bytes
//! - work factor: 250,000 iterations by default
//! - output: 32 bytes
//!
//! All of the above are part of the interoperability contract. Changing any
//! of them produces a different key with no error signal anywhere.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use pbkdf2::pbkdf2_hmac_array;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Length of a derived key in bytes
pub const KEY_LEN: usize = 32;

/// Default PBKDF2 iteration count
pub const DEFAULT_ITERATIONS: u32 = 250_000;

/// Fixed prefix of every channel salt
const SALT_PREFIX: &[u8] = b"hc:";

/// A 256-bit channel key. Wiped from memory on drop and never persisted.
#[derive(Clone)]
pub struct SymmetricKey(Zeroizing<[u8; KEY_LEN]>);

impl SymmetricKey {
    /// Wraps raw key bytes, e.g. a key obtained out of band.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

impl Eq for SymmetricKey {}

/// Build the salt for a channel: `"hc:" || channel`.
pub fn channel_salt(channel: &str) -> Vec<u8> {
    let mut salt = Vec::with_capacity(SALT_PREFIX.len() + channel.len());
    salt.extend_from_slice(SALT_PREFIX);
    salt.extend_from_slice(channel.as_bytes());
    salt
}

/// Derive the transport key for `channel` from `passphrase`.
///
/// Pure and deterministic. `iterations` must be at least 1; an empty
/// channel name is accepted but gives every unnamed channel the same key.
pub fn derive_key(passphrase: &[u8], channel: &str, iterations: u32) -> SymmetricKey {
    let salt = channel_salt(channel);
    SymmetricKey::from_bytes(pbkdf2_sha256(passphrase, &salt, iterations))
}

/// [`derive_key`] at [`DEFAULT_ITERATIONS`].
pub fn derive_default_key(passphrase: &[u8], channel: &str) -> SymmetricKey {
    derive_key(passphrase, channel, DEFAULT_ITERATIONS)
}

fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    pbkdf2_hmac_array::<Sha256, KEY_LEN>(password, salt, iterations)
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    passphrase_digest: [u8; 32],
    channel: String,
    iterations: u32,
}

/// Session-lifetime cache of derived keys.
///
/// Derivation costs tens of milliseconds at the default work factor, so a
/// client derives once per (passphrase, channel) and reuses the key. Entries
/// are indexed by a SHA-256 digest of the passphrase; the passphrase itself
/// is not retained.
#[derive(Default)]
pub struct KeyCache {
    entries: Mutex<HashMap<CacheKey, SymmetricKey>>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached key, deriving and remembering it on first use.
    pub fn get_or_derive(&self, passphrase: &[u8], channel: &str, iterations: u32) -> SymmetricKey {
        let cache_key = CacheKey {
            passphrase_digest: Sha256::digest(passphrase).into(),
            channel: channel.to_owned(),
            iterations,
        };

        if let Some(key) = self.entries.lock().get(&cache_key) {
            return key.clone();
        }

        // Derive without holding the lock so other channels are not blocked.
        let key = derive_key(passphrase, channel, iterations);
        tracing::debug!(channel, iterations, "derived channel key");
        self.entries
            .lock()
            .entry(cache_key)
            .or_insert(key)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops every cached key, e.g. when the session ends.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
