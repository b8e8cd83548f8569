use thiserror::Error;

use onionchat_shared::IdentityError;
use onionchat_store::StoreError;

use crate::backend::BackendError;

/// Errors returned by client operations.
///
/// Transport-level failures never show up here: they are observed as a
/// `Disconnected` status or a `Failed` message status.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The peer identity is not a valid onion hostname.
    #[error("Invalid peer identity: {0}")]
    InvalidIdentity(#[from] IdentityError),

    /// The request could not be handed to the backend.
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] BackendError),

    /// The connection was destroyed and no longer talks to the backend.
    #[error("Connection to {0} was destroyed")]
    Destroyed(String),

    #[error("Message is empty")]
    EmptyMessage,

    /// The newest cached message already holds the largest timestamp.
    #[error("No message timestamp left for {0}")]
    TimestampExhausted(String),

    #[error("No active chat")]
    NoActivePeer,

    /// The chat document has not been loaded from storage yet.
    #[error("Storage not loaded")]
    StorageNotLoaded,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Unknown backend event: {0}")]
    UnknownEvent(String),

    #[error("Invalid payload for {event}: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
