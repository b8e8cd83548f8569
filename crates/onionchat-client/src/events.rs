use serde::{Deserialize, Serialize};

use onionchat_shared::{ConnectionStatus, MessageStatus, PeerIdentity};

use crate::error::{ClientError, Result};

pub const EVENT_CLIENT_STATUS_UPDATE: &str = "client-status-update";
pub const EVENT_CLIENT_MESSAGE_RECEIVED: &str = "client-message-received";
pub const EVENT_CLIENT_MESSAGE_STATUS_UPDATE: &str = "client-message-status-update";
pub const EVENT_STORAGE_DIRTY: &str = "storage-dirty";

/// A peer's transport status changed.  `teardown` marks a final
/// `Disconnected` after which the connection object should be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatusUpdate {
    pub peer_id: PeerIdentity,
    pub status: ConnectionStatus,
    #[serde(default)]
    pub teardown: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceivedPayload {
    pub peer_id: PeerIdentity,
    pub text: String,
    /// Backend-assigned key of the stored message, when it sends one.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatusPayload {
    pub peer_id: PeerIdentity,
    pub timestamp: i64,
    pub status: MessageStatus,
}

/// Every event the backend pushes to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    ClientStatusUpdate(ClientStatusUpdate),
    MessageReceived(MessageReceivedPayload),
    MessageStatusUpdate(MessageStatusPayload),
    StorageDirty,
}

impl BackendEvent {
    /// Bridge name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClientStatusUpdate(_) => EVENT_CLIENT_STATUS_UPDATE,
            Self::MessageReceived(_) => EVENT_CLIENT_MESSAGE_RECEIVED,
            Self::MessageStatusUpdate(_) => EVENT_CLIENT_MESSAGE_STATUS_UPDATE,
            Self::StorageDirty => EVENT_STORAGE_DIRTY,
        }
    }

    /// The peer the event is about, if any.
    pub fn peer(&self) -> Option<&PeerIdentity> {
        match self {
            Self::ClientStatusUpdate(p) => Some(&p.peer_id),
            Self::MessageReceived(p) => Some(&p.peer_id),
            Self::MessageStatusUpdate(p) => Some(&p.peer_id),
            Self::StorageDirty => None,
        }
    }

    /// Decode an event in the bridge's `(name, JSON payload)` form.
    pub fn from_raw(name: &str, payload: serde_json::Value) -> Result<Self> {
        fn decode<T: serde::de::DeserializeOwned>(
            name: &str,
            payload: serde_json::Value,
        ) -> Result<T> {
            serde_json::from_value(payload).map_err(|source| ClientError::InvalidPayload {
                event: name.to_string(),
                source,
            })
        }

        match name {
            EVENT_CLIENT_STATUS_UPDATE => Ok(Self::ClientStatusUpdate(decode(name, payload)?)),
            EVENT_CLIENT_MESSAGE_RECEIVED => Ok(Self::MessageReceived(decode(name, payload)?)),
            EVENT_CLIENT_MESSAGE_STATUS_UPDATE => {
                Ok(Self::MessageStatusUpdate(decode(name, payload)?))
            }
            EVENT_STORAGE_DIRTY => Ok(Self::StorageDirty),
            other => Err(ClientError::UnknownEvent(other.to_string())),
        }
    }
}
