//! Golden test vector validation
//!
//! The vectors in `testdata/golden-vectors.json` were produced by an
//! independent PBKDF2 / AES-GCM implementation. Matching them byte for byte
//! is what lets clients built on other stacks share a channel.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use serde::Deserialize;

use hushchat::envelope::{self, NONCE_LEN};
use hushchat::kdf;
use hushchat::transport::{DECRYPT_FAILED_PLACEHOLDER, TransportEncryptor};

#[derive(Debug, Deserialize)]
struct GoldenVector {
    passphrase: String,
    channel: String,
    iterations: u32,
    key: String,
    nonce: String,
    plaintext: String,
    wire: String,
    comment: String,
}

fn load_golden_vectors() -> Vec<GoldenVector> {
    let json_data = include_str!("../testdata/golden-vectors.json");
    serde_json::from_str(json_data).expect("failed to parse golden vectors")
}

fn nonce_of(vector: &GoldenVector) -> [u8; NONCE_LEN] {
    BASE64_STANDARD
        .decode(&vector.nonce)
        .expect("failed to decode nonce")
        .try_into()
        .expect("nonce must be 12 bytes")
}

#[test]
fn test_derived_keys_match() {
    for vector in load_golden_vectors() {
        let key = kdf::derive_key(
            vector.passphrase.as_bytes(),
            &vector.channel,
            vector.iterations,
        );
        assert_eq!(
            hex::encode(key.as_bytes()),
            vector.key,
            "key mismatch: {}",
            vector.comment
        );
    }
}

#[test]
fn test_encryption_matches() {
    for vector in load_golden_vectors() {
        let key_bytes: [u8; kdf::KEY_LEN] = hex::decode(&vector.key)
            .expect("failed to decode key")
            .try_into()
            .expect("key must be 32 bytes");
        let encryptor = TransportEncryptor::new(kdf::SymmetricKey::from_bytes(key_bytes));

        let wire = encryptor
            .encrypt_with_nonce(&vector.plaintext, &nonce_of(&vector))
            .unwrap();
        assert_eq!(wire, vector.wire, "wire mismatch: {}", vector.comment);
    }
}

#[test]
fn test_decryption_matches() {
    for vector in load_golden_vectors() {
        let key_bytes: [u8; kdf::KEY_LEN] = hex::decode(&vector.key)
            .unwrap()
            .try_into()
            .unwrap();
        let encryptor = TransportEncryptor::new(kdf::SymmetricKey::from_bytes(key_bytes));

        assert_eq!(
            encryptor.try_decrypt(&vector.wire).unwrap(),
            vector.plaintext,
            "decrypt mismatch: {}",
            vector.comment
        );
    }
}

#[test]
fn test_vectors_are_channel_bound() {
    let vectors = load_golden_vectors();
    let lobby = vectors
        .iter()
        .find(|v| v.channel == "lobby" && v.iterations == 1000)
        .unwrap();
    let general = vectors.iter().find(|v| v.channel == "general").unwrap();

    // Same passphrase, nonce and text; only the channel differs.
    assert_eq!(lobby.passphrase, general.passphrase);
    assert_eq!(lobby.nonce, general.nonce);
    assert_ne!(lobby.key, general.key);
    assert_ne!(lobby.wire, general.wire);

    let general_key = kdf::derive_key(general.passphrase.as_bytes(), "general", 1000);
    let encryptor = TransportEncryptor::new(general_key);
    assert_eq!(encryptor.decrypt(&lobby.wire), DECRYPT_FAILED_PLACEHOLDER);
}

/// The reference scenario: "correct horse" / "lobby" / "hello" at the
/// default work factor.
#[test]
fn test_reference_scenario() {
    let key = kdf::derive_default_key(b"correct horse", "lobby");
    assert_eq!(key.as_bytes().len(), 32);

    let encryptor = TransportEncryptor::new(key);
    let wire = encryptor.encrypt("hello").unwrap();
    assert!(wire.starts_with("E2EE:"));

    let env = envelope::unwrap(&wire).unwrap();
    assert_eq!(env.v, 1);
    assert_eq!(env.nonce().unwrap().len(), 12);
    assert_eq!(env.sealed().unwrap().len(), "hello".len() + 16);

    assert_eq!(encryptor.decrypt(&wire), "hello");

    let vector = load_golden_vectors()
        .into_iter()
        .find(|v| v.iterations == kdf::DEFAULT_ITERATIONS)
        .unwrap();
    assert_eq!(encryptor.decrypt(&vector.wire), "hello");
}
