//! The persisted chat document.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer over IPC.  Chats are kept in a `BTreeMap` so the
//! serialized form is deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use onionchat_shared::{ChatMessage, PeerIdentity};

// ---------------------------------------------------------------------------
// StorageData
// ---------------------------------------------------------------------------

/// The full chat store: one [`StorageChat`] per peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageData {
    #[serde(default)]
    pub chats: BTreeMap<PeerIdentity, StorageChat>,
}

impl StorageData {
    pub fn chat(&self, peer: &PeerIdentity) -> Option<&StorageChat> {
        self.chats.get(peer)
    }

    /// The chat for `peer`, created empty if missing.
    pub fn chat_mut(&mut self, peer: &PeerIdentity) -> &mut StorageChat {
        self.chats
            .entry(peer.clone())
            .or_insert_with(|| StorageChat::new(peer.clone()))
    }

    /// Copy of the peer's message list (empty when the peer is unknown).
    pub fn messages(&self, peer: &PeerIdentity) -> Vec<ChatMessage> {
        self.chats
            .get(peer)
            .map(|chat| chat.messages.clone())
            .unwrap_or_default()
    }

    pub fn remove_chat(&mut self, peer: &PeerIdentity) -> Option<StorageChat> {
        self.chats.remove(peer)
    }

    /// Fold a freshly fetched document into one that has unsaved local edits.
    ///
    /// Message lists are merged by timestamp (see [`merge_messages`]).
    /// Nicknames and chats that only exist locally are kept; a remote
    /// nickname is only taken when there is no local one.
    pub fn merge_remote(&mut self, remote: StorageData) {
        for (peer, remote_chat) in remote.chats {
            match self.chats.get_mut(&peer) {
                Some(local) => {
                    let local_messages = std::mem::take(&mut local.messages);
                    local.messages = merge_messages(local_messages, remote_chat.messages);
                    if local.nickname.is_none() {
                        local.nickname = remote_chat.nickname;
                    }
                }
                None => {
                    self.chats.insert(peer, remote_chat);
                }
            }
        }
    }
}

/// Union of two message lists keyed by timestamp, in timestamp order.
///
/// For a timestamp present in both, the remote status is taken unless the
/// local entry has already moved past it (e.g. local `Success`, remote
/// `Sending`).
pub fn merge_messages(local: Vec<ChatMessage>, remote: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut merged = remote;
    for message in local {
        match merged.iter_mut().find(|m| m.timestamp == message.timestamp) {
            Some(existing) => {
                if !message.status.can_transition_to(existing.status) {
                    existing.status = message.status;
                }
            }
            None => merged.push(message),
        }
    }
    merged.sort_by_key(|m| m.timestamp);
    merged
}

// ---------------------------------------------------------------------------
// StorageChat
// ---------------------------------------------------------------------------

/// A conversation with one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChat {
    /// The remote peer's onion hostname.
    pub receiver_onion: PeerIdentity,
    /// Optional display name chosen by the local user.
    #[serde(default)]
    pub nickname: Option<String>,
    /// Messages in conversation order.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl StorageChat {
    pub fn new(receiver_onion: PeerIdentity) -> Self {
        Self {
            receiver_onion,
            nickname: None,
            messages: Vec::new(),
        }
    }
}
