//! The storage seam consumed by the client core.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::StorageData;

/// Encrypted persistent storage of the chat document.
///
/// The document is read and written as a whole.  Implementations serialize
/// their own writes; callers are expected to debounce (see the client's
/// storage sync).
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Whether persisted storage exists at all (first start vs. returning user).
    async fn exists(&self) -> Result<bool>;

    async fn is_unlocked(&self) -> Result<bool>;

    /// Unlock existing storage, or create empty storage protected by
    /// `passphrase`.  Fails with [`StoreError::WrongPassphrase`] when the
    /// passphrase does not match existing storage.
    ///
    /// [`StoreError::WrongPassphrase`]: crate::StoreError::WrongPassphrase
    async fn unlock_or_create(&self, passphrase: &str) -> Result<()>;

    /// The full persisted document.  Fails with `Locked` before unlocking.
    async fn get(&self) -> Result<StorageData>;

    /// Replace the full persisted document.
    async fn set(&self, data: StorageData) -> Result<()>;
}
