//! hushchat - passphrase-scoped chat encryption and a durable outbox
//!
//! - [`kdf`] derives a channel key from the group passphrase
//! - [`transport`] turns chat text into `E2EE:` envelopes and back
//! - [`outbox`] keeps committed-but-unacknowledged messages across restarts

#![forbid(unsafe_code)]

pub mod config;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod outbox;
pub mod passphrase;
pub mod transport;

pub use config::Config;
pub use error::{ErrorCategory, ErrorKind, HushchatError, Result};
pub use kdf::{KeyCache, SymmetricKey, derive_key};
pub use outbox::{DeliveryStatus, Outbox, PendingMessage, PendingMessageStore};
pub use transport::{DECRYPT_FAILED_PLACEHOLDER, TransportEncryptor};
