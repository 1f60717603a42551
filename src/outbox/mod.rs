//! Durable outbox of messages awaiting delivery confirmation
//!
//! A sender drives the outbox: it enqueues a message when the user submits
//! it, bumps the retry count and status as transmission attempts fail, and
//! removes the message once the network acknowledges it. Nothing here
//! schedules retries; that policy belongs to the sender.

mod model;
mod storage;
mod store;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

pub use model::{Attachment, DeliveryStatus, PendingMessage};
pub(crate) use storage::validate_key;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageLock};
pub use store::{DEFAULT_STORAGE_KEY, PendingMessageStore};

/// Shared handle to a [`PendingMessageStore`].
///
/// Each operation is a read-modify-write of the whole collection, so
/// unsynchronized writers would lose updates. Every call goes through one
/// mutex, so mutations from any thread holding a clone are applied one at a
/// time. Writers in other processes are kept out by [`Storage::lock`].
pub struct Outbox<S> {
    inner: Arc<Mutex<PendingMessageStore<S>>>,
}

impl<S> Clone for Outbox<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Storage> Outbox<S> {
    pub fn new(store: PendingMessageStore<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Opens the outbox under the default key of `storage`.
    pub fn open(storage: S) -> Self {
        Self::new(PendingMessageStore::open(storage))
    }

    pub fn enqueue(&self, message: PendingMessage) -> Result<bool> {
        self.inner.lock().enqueue(message)
    }

    /// A complete snapshot of the queue, oldest first.
    pub fn list(&self) -> Result<Vec<PendingMessage>> {
        self.inner.lock().list()
    }

    pub fn get(&self, id: &str) -> Result<Option<PendingMessage>> {
        self.inner.lock().get(id)
    }

    pub fn update_status(&self, id: &str, status: DeliveryStatus) -> Result<()> {
        self.inner.lock().update_status(id, status)
    }

    pub fn increment_retry(&self, id: &str) -> Result<()> {
        self.inner.lock().increment_retry(id)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.inner.lock().remove(id)
    }
}
