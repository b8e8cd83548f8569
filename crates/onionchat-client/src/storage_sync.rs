//! In-memory copy of the chat document and its write-back to storage.
//!
//! Local edits go through [`StorageSync::update`] and are persisted by a
//! single writer task: edits are debounced until a quiet interval has passed,
//! and only one `set` is ever in flight.  Edits made while a write is running
//! are picked up by the next cycle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use onionchat_shared::{ChatMessage, PeerIdentity};
use onionchat_store::{ChatStore, StorageData, StoreError};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Attempts made to re-fetch the document after a dirty notification.
const REFRESH_ATTEMPTS: u32 = 3;

#[derive(Default)]
struct SyncState {
    data: Option<StorageData>,
    /// Bumped on every local edit.
    revision: u64,
    /// Revision contained in the last successful write.
    saved_revision: u64,
}

impl SyncState {
    fn has_pending(&self) -> bool {
        self.revision != self.saved_revision
    }
}

pub struct StorageSync {
    store: Arc<dyn ChatStore>,
    debounce: Duration,
    retry_delay: Duration,
    state: Mutex<SyncState>,
    dirty: Notify,
    // Held for the duration of a `set`, so writes never overlap.
    write_lock: tokio::sync::Mutex<()>,
}

impl StorageSync {
    pub fn new(store: Arc<dyn ChatStore>, config: &ClientConfig) -> Self {
        Self {
            store,
            debounce: config.storage_debounce,
            retry_delay: config.storage_retry_delay,
            state: Mutex::new(SyncState::default()),
            dirty: Notify::new(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.store.exists().await?)
    }

    pub async fn is_unlocked(&self) -> Result<bool> {
        Ok(self.store.is_unlocked().await?)
    }

    /// Unlock (or create) storage.  A wrong passphrase is returned to the
    /// caller as `StoreError::WrongPassphrase`.
    pub async fn unlock_or_create(&self, passphrase: &str) -> Result<()> {
        self.store.unlock_or_create(passphrase).await?;
        info!("storage unlocked");
        Ok(())
    }

    /// Initial fetch of the document.  Failures are logged and retried every
    /// `retry_delay` until one succeeds.
    pub async fn load(&self) -> StorageData {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.store.get().await {
                Ok(data) => {
                    info!(chats = data.chats.len(), attempt, "chat storage loaded");
                    let mut state = self.state();
                    state.data = Some(data.clone());
                    state.saved_revision = state.revision;
                    return data;
                }
                Err(e) => {
                    warn!(error = %e, attempt, "failed to load chat storage, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state().data.is_some()
    }

    /// Snapshot of the whole document.
    pub fn data(&self) -> Option<StorageData> {
        self.state().data.clone()
    }

    /// The persisted message list of `peer`, or `None` before the document
    /// is loaded.
    pub fn messages(&self, peer: &PeerIdentity) -> Option<Vec<ChatMessage>> {
        self.state().data.as_ref().map(|data| data.messages(peer))
    }

    /// Apply a local edit and schedule a write.
    pub fn update<T>(&self, edit: impl FnOnce(&mut StorageData) -> T) -> Result<T> {
        let result = {
            let mut state = self.state();
            let data = state.data.as_mut().ok_or(ClientError::StorageNotLoaded)?;
            let result = edit(data);
            state.revision += 1;
            result
        };
        self.dirty.notify_one();
        Ok(result)
    }

    pub fn has_pending_writes(&self) -> bool {
        self.state().has_pending()
    }

    /// Re-fetch the document.  Without pending local edits the fetched copy
    /// replaces ours; otherwise it is merged in (see
    /// [`StorageData::merge_remote`]) and our next write wins.
    pub async fn refresh(&self) -> std::result::Result<(), StoreError> {
        let remote = self.store.get().await?;

        let mut state = self.state();
        let pending = state.has_pending();
        state.data = match state.data.take() {
            Some(mut local) if pending => {
                local.merge_remote(remote);
                Some(local)
            }
            _ => Some(remote),
        };
        debug!(pending, "chat storage refreshed");
        Ok(())
    }

    /// [`refresh`](Self::refresh) with a few retries, for dirty notifications.
    pub async fn refresh_with_retry(&self) -> std::result::Result<(), StoreError> {
        let mut attempt: u32 = 1;
        loop {
            match self.refresh().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < REFRESH_ATTEMPTS => {
                    warn!(error = %e, attempt, "storage refresh failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One fetch from storage, returning the peer's current message list.
    pub async fn fetch_messages(
        &self,
        peer: &PeerIdentity,
    ) -> std::result::Result<Vec<ChatMessage>, StoreError> {
        self.refresh().await?;
        Ok(self.messages(peer).unwrap_or_default())
    }

    /// Write pending edits now.  Returns whether anything was written.
    pub async fn flush(&self) -> std::result::Result<bool, StoreError> {
        let _writing = self.write_lock.lock().await;

        let (snapshot, revision) = {
            let state = self.state();
            match state.data.as_ref() {
                Some(data) if state.has_pending() => (data.clone(), state.revision),
                _ => return Ok(false),
            }
        };

        self.store.set(snapshot).await?;

        let mut state = self.state();
        state.saved_revision = state.saved_revision.max(revision);
        debug!(revision, "saved chat data");
        Ok(true)
    }

    /// Start the debounced writer task.
    pub fn spawn_writer(self: &Arc<Self>) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move { sync.writer_loop().await })
    }

    async fn writer_loop(&self) {
        debug!(debounce_ms = self.debounce.as_millis() as u64, "storage writer started");
        loop {
            self.dirty.notified().await;

            // Wait for a quiet interval.
            while tokio::time::timeout(self.debounce, self.dirty.notified())
                .await
                .is_ok()
            {}

            if let Err(e) = self.flush().await {
                warn!(error = %e, "failed to save chat data, retrying");
                tokio::time::sleep(self.retry_delay).await;
                self.dirty.notify_one();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{peer, CountingStore};

    fn sync_with(store: Arc<CountingStore>) -> Arc<StorageSync> {
        Arc::new(StorageSync::new(store, &ClientConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_retries_until_success() {
        let store = Arc::new(CountingStore::unlocked());
        store.fail_next_gets(2);
        let sync = sync_with(store.clone());

        assert!(!sync.is_loaded());
        sync.load().await;
        assert!(sync.is_loaded());
        assert_eq!(store.gets(), 3);
    }

    #[tokio::test]
    async fn test_update_before_load_fails() {
        let sync = sync_with(Arc::new(CountingStore::unlocked()));
        assert!(matches!(
            sync.update(|_| ()),
            Err(ClientError::StorageNotLoaded)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_written_once() {
        let store = Arc::new(CountingStore::unlocked());
        let sync = sync_with(store.clone());
        sync.load().await;
        let writer = sync.spawn_writer();

        for name in ["a", "b", "c"] {
            sync.update(|data| data.chat_mut(&peer(name)).nickname = Some(name.into()))
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(store.sets(), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.sets(), 1);
        assert!(!sync.has_pending_writes());
        assert_eq!(store.snapshot().chats.len(), 3);

        writer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_write_is_deferred() {
        let store = Arc::new(CountingStore::unlocked().with_set_delay(Duration::from_millis(200)));
        let sync = sync_with(store.clone());
        sync.load().await;
        let writer = sync.spawn_writer();

        sync.update(|data| {
            data.chat_mut(&peer("a"));
        })
        .unwrap();
        // Debounce elapses at 350ms, the write runs until 550ms.
        tokio::time::sleep(Duration::from_millis(450)).await;
        sync.update(|data| {
            data.chat_mut(&peer("b"));
        })
        .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.sets(), 2);
        assert_eq!(store.max_concurrent_sets(), 1);
        assert!(store.snapshot().chat(&peer("b")).is_some());

        writer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_is_retried() {
        let store = Arc::new(CountingStore::unlocked());
        store.fail_next_sets(1);
        let sync = sync_with(store.clone());
        sync.load().await;
        let writer = sync.spawn_writer();

        sync.update(|data| {
            data.chat_mut(&peer("a"));
        })
        .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(store.sets(), 2);
        assert!(!sync.has_pending_writes());
        assert!(store.snapshot().chat(&peer("a")).is_some());

        writer.abort();
    }

    #[tokio::test]
    async fn test_refresh_merges_pending_edits() {
        let store = Arc::new(CountingStore::unlocked());
        let sync = sync_with(store.clone());
        sync.load().await;

        sync.update(|data| data.chat_mut(&peer("a")).nickname = Some("Local".into()))
            .unwrap();
        store.edit(|data| {
            data.chat_mut(&peer("a"))
                .messages
                .push(ChatMessage::incoming("remote", 5))
        });

        sync.refresh().await.unwrap();

        let data = sync.data().unwrap();
        let chat = data.chat(&peer("a")).unwrap();
        assert_eq!(chat.nickname.as_deref(), Some("Local"));
        assert_eq!(chat.messages.len(), 1);
        assert!(sync.has_pending_writes());
    }

    #[tokio::test]
    async fn test_flush_without_edits_is_noop() {
        let store = Arc::new(CountingStore::unlocked());
        let sync = sync_with(store.clone());
        sync.load().await;

        assert!(!sync.flush().await.unwrap());
        sync.update(|data| {
            data.chat_mut(&peer("a"));
        })
        .unwrap();
        assert!(sync.flush().await.unwrap());
        assert_eq!(store.sets(), 1);
    }

    #[tokio::test]
    async fn test_flushed_messages_load_back_unchanged() {
        let store = Arc::new(CountingStore::unlocked());
        let sync = sync_with(store.clone());
        sync.load().await;

        let mut delivered = ChatMessage::outgoing("hello", 10);
        delivered.status = onionchat_shared::MessageStatus::Success;
        let written = vec![delivered, ChatMessage::incoming("hi back", 11)];
        sync.update(|data| {
            let chat = data.chat_mut(&peer("alice"));
            chat.nickname = Some("Alice".into());
            chat.messages = written.clone();
        })
        .unwrap();
        sync.flush().await.unwrap();

        let reopened = sync_with(store);
        let loaded = reopened.load().await;

        assert_eq!(Some(loaded), sync.data());
        assert_eq!(reopened.messages(&peer("alice")), Some(written));
    }
}
