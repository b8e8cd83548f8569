use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The storage has not been unlocked yet.
    #[error("Storage is locked")]
    Locked,

    /// The passphrase does not decrypt the existing storage.
    #[error("Wrong passphrase")]
    WrongPassphrase,

    /// The storage file exists but is not a valid storage file.
    #[error("Storage file is corrupted: {0}")]
    Corrupted(String),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Key derivation failure.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Encryption failure.
    #[error("Encryption failed")]
    EncryptionFailed,

    /// The store could not be reached (backend gone, task failure, ...).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Generic I/O error (e.g. creating the storage directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of the chat document.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
