//! Read-modify-write operations over the persisted outbox blob

use crate::error::{ErrorCategory, ErrorKind, HushchatError, Result};

use super::model::{DeliveryStatus, PendingMessage};
use super::storage::Storage;
use super::validate_key;

/// Storage key the outbox lives under unless configured otherwise
pub const DEFAULT_STORAGE_KEY: &str = "pending_messages";

/// Durable, ordered ledger of messages awaiting acknowledgement.
///
/// Every operation loads the whole collection from storage, and every
/// mutator writes the whole collection back. The store never decides to
/// retry or drop anything on its own; the sender drives it.
///
/// Mutators take `&mut self`, so a single owner is the only writer. Share
/// it across threads through [`Outbox`](super::Outbox). Each mutator also
/// holds the storage lock from load to save, which serializes stores in
/// other processes working on the same key.
#[derive(Debug)]
pub struct PendingMessageStore<S> {
    storage: S,
    key: String,
}

impl<S: Storage> PendingMessageStore<S> {
    /// Opens the outbox stored under [`DEFAULT_STORAGE_KEY`].
    pub fn open(storage: S) -> Self {
        Self {
            storage,
            key: DEFAULT_STORAGE_KEY.to_owned(),
        }
    }

    /// Opens the outbox stored under a custom key.
    pub fn with_key(storage: S, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Self { storage, key })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Gives back the underlying storage, e.g. to reopen it later.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Adds `message` at the end of the outbox with status `sending` and a
    /// retry count of 0.
    ///
    /// Returns `false` without touching storage when a message with the
    /// same id is already queued.
    pub fn enqueue(&mut self, mut message: PendingMessage) -> Result<bool> {
        let _lock = self.storage.lock(&self.key)?;
        let mut messages = self.load()?;
        if messages.iter().any(|m| m.id == message.id) {
            tracing::debug!(id = %message.id, "message already queued");
            return Ok(false);
        }

        message.status = DeliveryStatus::Sending;
        message.retry_count = 0;
        tracing::debug!(id = %message.id, channel = %message.channel, "enqueue");
        messages.push(message);
        self.save(&messages)?;
        Ok(true)
    }

    /// All queued messages, oldest first.
    pub fn list(&self) -> Result<Vec<PendingMessage>> {
        self.load()
    }

    pub fn get(&self, id: &str) -> Result<Option<PendingMessage>> {
        Ok(self.load()?.into_iter().find(|m| m.id == id))
    }

    /// Sets the status of message `id`. Unknown ids are ignored.
    pub fn update_status(&mut self, id: &str, status: DeliveryStatus) -> Result<()> {
        self.modify(id, "update_status", |m| m.status = status)
    }

    /// Adds exactly one to the retry count of message `id`. Unknown ids are ignored.
    pub fn increment_retry(&mut self, id: &str) -> Result<()> {
        self.modify(id, "increment_retry", |m| {
            m.retry_count = m.retry_count.saturating_add(1);
        })
    }

    /// Deletes message `id`. Unknown ids are ignored.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        let _lock = self.storage.lock(&self.key)?;
        let mut messages = self.load()?;
        let Some(pos) = messages.iter().position(|m| m.id == id) else {
            tracing::debug!(id, "remove: no such message");
            return Ok(());
        };
        messages.remove(pos);
        tracing::debug!(id, "remove");
        self.save(&messages)
    }

    fn modify(
        &mut self,
        id: &str,
        op: &'static str,
        apply: impl FnOnce(&mut PendingMessage),
    ) -> Result<()> {
        let _lock = self.storage.lock(&self.key)?;
        let mut messages = self.load()?;
        let Some(message) = messages.iter_mut().find(|m| m.id == id) else {
            tracing::debug!(id, op, "no such message");
            return Ok(());
        };
        apply(message);
        tracing::debug!(
            id,
            op,
            status = %message.status,
            retry_count = message.retry_count,
            "modify"
        );
        self.save(&messages)
    }

    fn load(&self) -> Result<Vec<PendingMessage>> {
        let Some(blob) = self.storage.read(&self.key)? else {
            return Ok(Vec::new());
        };
        let messages: Vec<PendingMessage> = serde_json::from_slice(&blob).map_err(|e| {
            HushchatError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::StoreCorrupt,
                format!("outbox {:?} is corrupt: {}", self.key, e),
                e,
            )
        })?;
        tracing::trace!(key = %self.key, count = messages.len(), "loaded outbox");
        Ok(messages)
    }

    fn save(&mut self, messages: &[PendingMessage]) -> Result<()> {
        let blob = serde_json::to_vec(messages).map_err(|e| {
            HushchatError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Serialization,
                "failed to serialize outbox",
                e,
            )
        })?;
        self.storage.write(&self.key, &blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::model::Attachment;
    use crate::outbox::storage::{FileStorage, MemoryStorage};
    use tempfile::TempDir;

    fn store() -> PendingMessageStore<MemoryStorage> {
        PendingMessageStore::open(MemoryStorage::new())
    }

    fn msg(id: &str) -> PendingMessage {
        PendingMessage::new(id, "lobby", "alice", format!("text of {}", id))
    }

    /// Storage whose writes always fail, to check errors reach the caller.
    struct BrokenStorage;

    impl Storage for BrokenStorage {
        fn read(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        fn write(&mut self, _key: &str, _blob: &[u8]) -> Result<()> {
            Err(HushchatError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "disk full",
            ))
        }
    }

    #[test]
    fn test_lifecycle() {
        let mut store = store();
        assert!(store.enqueue(msg("m1")).unwrap());

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, DeliveryStatus::Sending);
        assert_eq!(listed[0].retry_count, 0);

        store.increment_retry("m1").unwrap();
        store.update_status("m1", DeliveryStatus::Failed).unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed[0].retry_count, 1);
        assert_eq!(listed[0].status, DeliveryStatus::Failed);

        store.remove("m1").unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_enqueue_resets_status_and_retries() {
        let mut store = store();
        let mut m = msg("m1");
        m.status = DeliveryStatus::Sent;
        m.retry_count = 9;
        store.enqueue(m).unwrap();

        let stored = store.get("m1").unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Sending);
        assert_eq!(stored.retry_count, 0);
    }

    #[test]
    fn test_insertion_order() {
        let mut store = store();
        for id in ["c", "a", "b"] {
            store.enqueue(msg(id)).unwrap();
        }
        store.remove("a").unwrap();
        store.enqueue(msg("d")).unwrap();

        let ids: Vec<_> = store.list().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["c", "b", "d"]);
    }

    #[test]
    fn test_duplicate_id_is_ignored() {
        let mut store = store();
        assert!(store.enqueue(msg("m1")).unwrap());
        store.increment_retry("m1").unwrap();

        let mut dup = msg("m1");
        dup.text = "replacement".into();
        assert!(!store.enqueue(dup).unwrap());

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].text, "text of m1");
        assert_eq!(listed[0].retry_count, 1);
    }

    #[test]
    fn test_missing_ids_are_noops() {
        let mut store = store();
        store.enqueue(msg("m1")).unwrap();
        let before = store.list().unwrap();

        store.remove("nonexistent").unwrap();
        store.update_status("nonexistent", DeliveryStatus::Sent).unwrap();
        store.increment_retry("nonexistent").unwrap();
        store.remove("nonexistent").unwrap();

        assert_eq!(store.list().unwrap(), before);
    }

    #[test]
    fn test_missing_ids_on_empty_store_write_nothing() {
        let mut store = store();
        store.remove("x").unwrap();
        store.update_status("x", DeliveryStatus::Failed).unwrap();
        assert_eq!(store.into_storage().read(DEFAULT_STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn test_retries_accumulate() {
        let mut store = store();
        store.enqueue(msg("m1")).unwrap();
        store.increment_retry("m1").unwrap();
        store.increment_retry("m1").unwrap();
        assert_eq!(store.get("m1").unwrap().unwrap().retry_count, 2);
    }

    #[test]
    fn test_only_target_is_touched() {
        let mut store = store();
        store.enqueue(msg("m1")).unwrap();
        store.enqueue(msg("m2")).unwrap();
        store.update_status("m2", DeliveryStatus::Failed).unwrap();
        store.increment_retry("m2").unwrap();

        let m1 = store.get("m1").unwrap().unwrap();
        assert_eq!(m1.status, DeliveryStatus::Sending);
        assert_eq!(m1.retry_count, 0);
    }

    #[test]
    fn test_reload_from_memory_storage() {
        let mut store = store();
        store.enqueue(msg("m1")).unwrap();
        store
            .enqueue(msg("m2").with_attachments(vec![Attachment {
                id: "a1".into(),
                kind: "file".into(),
                filename: "notes.txt".into(),
                url: "https://files.example/notes.txt".into(),
            }]))
            .unwrap();
        store.update_status("m1", DeliveryStatus::Failed).unwrap();
        store.increment_retry("m1").unwrap();
        let before = store.list().unwrap();

        let reopened = PendingMessageStore::open(store.into_storage());
        assert_eq!(reopened.list().unwrap(), before);
    }

    #[test]
    fn test_reload_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let before = {
            let mut store = PendingMessageStore::open(FileStorage::open(temp_dir.path()).unwrap());
            store.enqueue(msg("m1")).unwrap();
            store.enqueue(msg("m2")).unwrap();
            store.increment_retry("m2").unwrap();
            store.list().unwrap()
        };

        let store = PendingMessageStore::open(FileStorage::open(temp_dir.path()).unwrap());
        assert_eq!(store.list().unwrap(), before);
    }

    #[test]
    fn test_separate_stores_on_one_file_do_not_lose_updates() {
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let mut store = PendingMessageStore::open(FileStorage::open(temp_dir.path()).unwrap());
        store.enqueue(msg("m1")).unwrap();

        // Each thread owns its own store, as separate processes would.
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let dir = temp_dir.path().to_path_buf();
                thread::spawn(move || {
                    let mut store = PendingMessageStore::open(FileStorage::open(dir).unwrap());
                    for _ in 0..10 {
                        store.increment_retry("m1").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("m1").unwrap().unwrap().retry_count, 60);
    }

    #[test]
    fn test_keys_are_independent() {
        let storage = MemoryStorage::new();
        let mut a = PendingMessageStore::with_key(storage, "outbox_a").unwrap();
        a.enqueue(msg("m1")).unwrap();

        let b = PendingMessageStore::with_key(a.into_storage(), "outbox_b").unwrap();
        assert!(b.list().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_key() {
        let err = PendingMessageStore::with_key(MemoryStorage::new(), "../x").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::InvalidConfig));
    }

    #[test]
    fn test_corrupt_blob_is_an_error() {
        let mut storage = MemoryStorage::new();
        storage.write(DEFAULT_STORAGE_KEY, b"{not json").unwrap();
        let mut store = PendingMessageStore::open(storage);

        assert_eq!(store.list().unwrap_err().kind, Some(ErrorKind::StoreCorrupt));
        assert_eq!(
            store.enqueue(msg("m1")).unwrap_err().kind,
            Some(ErrorKind::StoreCorrupt)
        );
    }

    #[test]
    fn test_write_failures_propagate() {
        let mut store = PendingMessageStore::open(BrokenStorage);
        let err = store.enqueue(msg("m1")).expect_err("expected write failure");
        assert_eq!(err.kind, Some(ErrorKind::Io));
    }
}
