//! Passphrase-encrypted chat storage in a single file.
//!
//! The file is decrypted once on unlock and kept in memory; every `set`
//! re-encrypts the whole document and replaces the file atomically (write to
//! a temp file, then rename).  On unix the file is created owner-only.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::ProjectDirs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use onionchat_shared::constants::APP_NAME;

use crate::cipher::{self, SymmetricKey, SALT_SIZE};
use crate::error::{Result, StoreError};
use crate::models::StorageData;
use crate::store::ChatStore;

struct Unlocked {
    key: SymmetricKey,
    salt: [u8; SALT_SIZE],
    /// Known plaintext sealed with `key`; a later unlock must open it.
    verifier: Vec<u8>,
    data: StorageData,
}

const VERIFIER_PLAINTEXT: &[u8] = b"onionchat-unlock-verifier";

/// [`ChatStore`] backed by an encrypted file.
pub struct EncryptedFileStore {
    path: PathBuf,
    state: Mutex<Option<Unlocked>>,
}

impl EncryptedFileStore {
    /// Use the default storage file in the platform data directory:
    /// - Linux:   `~/.local/share/onionchat/storage.bin`
    /// - macOS:   `~/Library/Application Support/com.onionchat.onionchat/storage.bin`
    /// - Windows: `{FOLDERID_RoamingAppData}\onionchat\onionchat\data\storage.bin`
    pub fn open_default() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", APP_NAME, APP_NAME).ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Ok(Self::open_at(data_dir.join("storage.bin")))
    }

    /// Use an explicit file path.  Nothing is read until unlock.
    pub fn open_at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        tracing::info!(path = %path.display(), "using encrypted storage file");
        Self {
            path,
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_file(&self, unlocked: &Unlocked, data: &StorageData) -> Result<()> {
        let plaintext = serde_json::to_vec(data)?;
        let raw = cipher::seal(&unlocked.key, &unlocked.salt, &plaintext)?;

        let tmp = self.path.with_extension("tmp");
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp).await?;
        file.write_all(&raw).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), bytes = raw.len(), "storage written");
        Ok(())
    }
}

async fn derive_key_blocking(passphrase: &str, salt: [u8; SALT_SIZE]) -> Result<SymmetricKey> {
    let passphrase = passphrase.as_bytes().to_vec();
    tokio::task::spawn_blocking(move || cipher::derive_key(&passphrase, &salt))
        .await
        .map_err(|e| StoreError::Unavailable(format!("key derivation task failed: {e}")))?
}

#[async_trait]
impl ChatStore for EncryptedFileStore {
    async fn exists(&self) -> Result<bool> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_unlocked(&self) -> Result<bool> {
        Ok(self.state.lock().await.is_some())
    }

    async fn unlock_or_create(&self, passphrase: &str) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Some(unlocked) = state.as_ref() {
            let key = derive_key_blocking(passphrase, unlocked.salt).await?;
            cipher::decrypt(&key, &unlocked.verifier)?;
            return Ok(());
        }

        let unlocked = if self.exists().await? {
            let raw = tokio::fs::read(&self.path).await?;
            let (salt, sealed) = cipher::split_header(&raw)?;
            let key = derive_key_blocking(passphrase, salt).await?;
            let plaintext = cipher::decrypt(&key, sealed)?;
            let data: StorageData = serde_json::from_slice(&plaintext)?;

            tracing::info!(chats = data.chats.len(), "storage unlocked");
            let verifier = cipher::encrypt(&key, VERIFIER_PLAINTEXT)?;
            Unlocked {
                key,
                salt,
                verifier,
                data,
            }
        } else {
            let salt = cipher::generate_salt();
            let key = derive_key_blocking(passphrase, salt).await?;
            let verifier = cipher::encrypt(&key, VERIFIER_PLAINTEXT)?;
            let unlocked = Unlocked {
                key,
                salt,
                verifier,
                data: StorageData::default(),
            };
            self.write_file(&unlocked, &unlocked.data).await?;

            tracing::info!(path = %self.path.display(), "storage created");
            unlocked
        };

        *state = Some(unlocked);
        Ok(())
    }

    async fn get(&self) -> Result<StorageData> {
        let state = self.state.lock().await;
        state
            .as_ref()
            .map(|unlocked| unlocked.data.clone())
            .ok_or(StoreError::Locked)
    }

    async fn set(&self, data: StorageData) -> Result<()> {
        let mut state = self.state.lock().await;
        let unlocked = state.as_mut().ok_or(StoreError::Locked)?;

        self.write_file(unlocked, &data).await?;
        unlocked.data = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onionchat_shared::{ChatMessage, MessageStatus, PeerIdentity};

    fn sample_data() -> StorageData {
        let mut data = StorageData::default();
        let chat = data.chat_mut(&PeerIdentity::new("alice"));
        chat.nickname = Some("Alice".into());
        chat.messages.push(ChatMessage::outgoing("hello", 1_700_000_000_000));
        chat.messages.push(ChatMessage {
            text: "hi back".into(),
            sent_by_self: false,
            timestamp: 1_700_000_000_500,
            status: MessageStatus::Success,
        });
        data
    }

    #[tokio::test]
    async fn test_create_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.bin");

        let store = EncryptedFileStore::open_at(&path);
        assert!(!store.exists().await.unwrap());
        assert!(matches!(store.get().await, Err(StoreError::Locked)));

        store.unlock_or_create("passphrase").await.unwrap();
        assert!(store.exists().await.unwrap());
        assert!(store.is_unlocked().await.unwrap());

        let data = sample_data();
        store.set(data.clone()).await.unwrap();
        assert_eq!(store.get().await.unwrap(), data);

        // A fresh instance reads the same document back from disk.
        let reopened = EncryptedFileStore::open_at(&path);
        assert!(!reopened.is_unlocked().await.unwrap());
        reopened.unlock_or_create("passphrase").await.unwrap();
        assert_eq!(reopened.get().await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_wrong_passphrase_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.bin");

        EncryptedFileStore::open_at(&path)
            .unlock_or_create("right")
            .await
            .unwrap();

        let store = EncryptedFileStore::open_at(&path);
        assert!(matches!(
            store.unlock_or_create("wrong").await,
            Err(StoreError::WrongPassphrase)
        ));
        assert!(!store.is_unlocked().await.unwrap());
    }

    #[tokio::test]
    async fn test_unlocked_store_checks_passphrase_again() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open_at(dir.path().join("storage.bin"));
        store.unlock_or_create("right").await.unwrap();

        assert!(matches!(
            store.unlock_or_create("wrong").await,
            Err(StoreError::WrongPassphrase)
        ));
        store.unlock_or_create("right").await.unwrap();
        assert!(store.is_unlocked().await.unwrap());
    }

    #[tokio::test]
    async fn test_file_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.bin");

        let store = EncryptedFileStore::open_at(&path);
        store.unlock_or_create("passphrase").await.unwrap();
        store.set(sample_data()).await.unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..4], &cipher::MAGIC);
        let needle = b"hello";
        assert!(!raw.windows(needle.len()).any(|w| w == needle));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.bin");

        let store = EncryptedFileStore::open_at(&path);
        store.unlock_or_create("passphrase").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
