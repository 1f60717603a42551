//! Runtime settings for the outbox location and key derivation work factor

use std::path::PathBuf;

use crate::error::{ErrorCategory, ErrorKind, HushchatError, Result};
use crate::kdf::DEFAULT_ITERATIONS;
use crate::outbox::{self, FileStorage, Outbox};
use crate::transport::TransportEncryptor;

/// Default directory holding persisted state, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = "hushchat-data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the outbox file.
    pub data_dir: PathBuf,
    /// Storage key (file stem) of the outbox.
    pub storage_key: String,
    /// PBKDF2 iteration count. Every member of a channel must agree on it.
    pub kdf_iterations: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            storage_key: outbox::DEFAULT_STORAGE_KEY.to_owned(),
            kdf_iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.validate_iterations()?;
        if self.data_dir.as_os_str().is_empty() {
            return Err(HushchatError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidConfig,
                "data directory must not be empty",
            ));
        }
        outbox::validate_key(&self.storage_key)
    }

    /// Opens the file-backed outbox this configuration points at.
    pub fn open_outbox(&self) -> Result<Outbox<FileStorage>> {
        self.validate()?;
        let storage = FileStorage::open(&self.data_dir)?;
        let store = outbox::PendingMessageStore::with_key(storage, &self.storage_key)?;
        Ok(Outbox::new(store))
    }

    /// Derives the key for `channel` at the configured work factor.
    pub fn encryptor(&self, passphrase: &[u8], channel: &str) -> Result<TransportEncryptor> {
        self.validate_iterations()?;
        Ok(TransportEncryptor::for_channel(
            passphrase,
            channel,
            self.kdf_iterations,
        ))
    }

    fn validate_iterations(&self) -> Result<()> {
        if self.kdf_iterations == 0 {
            return Err(HushchatError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidConfig,
                "kdf iterations must be at least 1",
            ));
        }
        Ok(())
    }
}
