//! # onionchat-store
//!
//! Persistent chat storage for onionchat.
//!
//! The whole chat history lives in a single document ([`StorageData`]) keyed
//! by peer identity.  Consumers only talk to the [`ChatStore`] trait; the
//! crate ships an in-memory implementation and a passphrase-encrypted file
//! implementation.

pub mod cipher;
pub mod encrypted;
pub mod memory;
pub mod models;
pub mod store;

mod error;

pub use encrypted::EncryptedFileStore;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use models::*;
pub use store::ChatStore;
