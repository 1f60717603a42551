//! Key/blob persistence backends for the outbox
//!
//! The outbox is stored as one serialized blob under one key, so a backend
//! only needs whole-value reads and writes. Writes must be all-or-nothing:
//! a reader sees either the previous blob or the new one, never a mix.
//! Writers that read-modify-write a blob hold [`Storage::lock`] meanwhile.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{ErrorCategory, ErrorKind, HushchatError, Result};

/// Whole-value blob storage addressed by a string key.
pub trait Storage: Send {
    /// Returns the blob stored under `key`, or `None` if nothing was ever written.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replaces the blob stored under `key`.
    fn write(&mut self, key: &str, blob: &[u8]) -> Result<()>;

    /// Takes an exclusive lock on `key`, blocking until every other holder
    /// has released it. The lock lasts until the returned guard is dropped.
    ///
    /// Backends that are never shared outside one owner need no lock.
    fn lock(&self, _key: &str) -> Result<StorageLock> {
        Ok(StorageLock::default())
    }
}

/// Guard for [`Storage::lock`].
#[derive(Debug, Default)]
pub struct StorageLock {
    // The OS releases the lock when the file is closed.
    _file: Option<File>,
}

/// In-process storage; contents vanish with the value.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn write(&mut self, key: &str, blob: &[u8]) -> Result<()> {
        self.blobs.insert(key.to_owned(), blob.to_vec());
        Ok(())
    }
}

/// Stores each key as `<dir>/<key>.json`.
///
/// [`Storage::lock`] takes an OS advisory lock on `<dir>/<key>.lock`, so
/// handles in different processes (and different handles in one process)
/// exclude each other.
///
/// Every write goes to a temporary file in the same directory which is
/// flushed, fsynced and then renamed over the target, so a crash leaves
/// either the old or the new file in place. Files are created with mode
/// 0o600 on Unix systems.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Opens (and creates if needed) the data directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| HushchatError::io(format!("failed to create {}", dir.display()), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }

    fn lock_path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.lock", key)))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HushchatError::io(
                format!("failed to read from {}", path.display()),
                e,
            )),
        }
    }

    fn write(&mut self, key: &str, blob: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        write_atomic(&self.dir, &path, blob)
            .map_err(|e| e.with_context(format!("failed to write to {}", path.display())))
    }

    fn lock(&self, key: &str) -> Result<StorageLock> {
        use fs4::fs_std::FileExt;

        let path = self.lock_path_for(key)?;
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options
            .open(&path)
            .map_err(|e| HushchatError::io(format!("failed to open {}", path.display()), e))?;
        file.lock_exclusive()
            .map_err(|e| HushchatError::io(format!("failed to lock {}", path.display()), e))?;
        tracing::trace!(path = %path.display(), "acquired storage lock");
        Ok(StorageLock { _file: Some(file) })
    }
}

/// Storage keys become file names, so only a conservative alphabet is allowed.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(HushchatError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidConfig,
            format!(
                "invalid storage key {:?}; use letters, digits, '_' or '-'",
                key
            ),
        ))
    }
}

fn write_atomic(dir: &Path, target: &Path, contents: &[u8]) -> Result<()> {
    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| HushchatError::io("failed to create tempfile", e))?;

    temp_file
        .write_all(contents)
        .map_err(|e| HushchatError::io("failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a complete file.
    temp_file
        .flush()
        .map_err(|e| HushchatError::io("failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| HushchatError::io("failed to sync file prior to rename", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| HushchatError::io("failed to get tempfile metadata", e))?
            .permissions();
        perms.set_mode(0o600);
        temp_file
            .as_file()
            .set_permissions(perms)
            .map_err(|e| HushchatError::io("failed to set tempfile permissions", e))?;
    }

    temp_file.persist(target).map_err(|e| {
        HushchatError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", target.display()),
            e,
        )
    })?;

    // The rename is only durable once the directory entry is on disk.
    #[cfg(unix)]
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| HushchatError::io("failed to sync directory after rename", e))?;
    Ok(())
}
