//! Unencrypted in-memory [`ChatStore`], for ephemeral sessions and tests.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::models::StorageData;
use crate::store::ChatStore;

#[derive(Debug, Default)]
struct Inner {
    passphrase: Option<String>,
    unlocked: bool,
    data: StorageData,
}

/// Keeps the chat document in process memory.
///
/// The passphrase is remembered on creation so that unlocking with a
/// different one fails the same way the encrypted store does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// A store that has never been created.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that is already unlocked and holds `data`.
    pub fn unlocked(data: StorageData) -> Self {
        Self {
            inner: Mutex::new(Inner {
                passphrase: None,
                unlocked: true,
                data,
            }),
        }
    }

    /// Copy of the held document, regardless of lock state.
    pub fn snapshot(&self) -> Result<StorageData> {
        Ok(self.lock()?.data.clone())
    }

    /// Replace the held document directly, as another session writing the
    /// same storage would.
    pub fn replace(&self, data: StorageData) -> Result<()> {
        self.lock()?.data = data;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn exists(&self) -> Result<bool> {
        let inner = self.lock()?;
        Ok(inner.unlocked || inner.passphrase.is_some())
    }

    async fn is_unlocked(&self) -> Result<bool> {
        Ok(self.lock()?.unlocked)
    }

    async fn unlock_or_create(&self, passphrase: &str) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.passphrase.as_deref() {
            Some(existing) if existing != passphrase => return Err(StoreError::WrongPassphrase),
            Some(_) => {}
            None => inner.passphrase = Some(passphrase.to_string()),
        }
        inner.unlocked = true;
        Ok(())
    }

    async fn get(&self) -> Result<StorageData> {
        let inner = self.lock()?;
        if !inner.unlocked {
            return Err(StoreError::Locked);
        }
        Ok(inner.data.clone())
    }

    async fn set(&self, data: StorageData) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.unlocked {
            return Err(StoreError::Locked);
        }
        inner.data = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onionchat_shared::{ChatMessage, PeerIdentity};

    #[tokio::test]
    async fn test_locked_until_unlocked() {
        let store = MemoryStore::new();
        assert!(!store.exists().await.unwrap());
        assert!(matches!(store.get().await, Err(StoreError::Locked)));

        store.unlock_or_create("secret").await.unwrap();
        assert!(store.is_unlocked().await.unwrap());
        assert_eq!(store.get().await.unwrap(), StorageData::default());
    }

    #[tokio::test]
    async fn test_wrong_passphrase() {
        let store = MemoryStore::new();
        store.unlock_or_create("secret").await.unwrap();
        assert!(matches!(
            store.unlock_or_create("other").await,
            Err(StoreError::WrongPassphrase)
        ));
    }

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let store = MemoryStore::unlocked(StorageData::default());
        let peer = PeerIdentity::new("alice");

        let mut data = StorageData::default();
        data.chat_mut(&peer)
            .messages
            .extend([ChatMessage::outgoing("one", 1), ChatMessage::incoming("two", 2)]);

        store.set(data.clone()).await.unwrap();
        assert_eq!(store.get().await.unwrap(), data);
    }
}
