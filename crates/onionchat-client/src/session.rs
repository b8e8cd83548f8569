//! Contact list and the currently open chat.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info};

use onionchat_shared::{ChatMessage, ConnectionStatus, PeerIdentity};

use crate::backend::Backend;
use crate::connection::PeerConnection;
use crate::error::{ClientError, Result};
use crate::observers::{ListenerId, ObserverList};
use crate::registry::Registry;
use crate::storage_sync::StorageSync;

/// A row of the contact list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub peer: PeerIdentity,
    pub nickname: Option<String>,
    pub status: ConnectionStatus,
}

impl Contact {
    /// Nickname if set, otherwise the start of the hostname.
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or_else(|| self.peer.short())
    }
}

pub struct ChatSession {
    backend: Arc<dyn Backend>,
    storage: Arc<StorageSync>,
    registry: Arc<Registry>,
    active: Mutex<Option<PeerIdentity>>,
    active_listeners: ObserverList<Option<PeerIdentity>>,
}

impl ChatSession {
    pub fn new(
        backend: Arc<dyn Backend>,
        storage: Arc<StorageSync>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            backend,
            storage,
            registry,
            active: Mutex::new(None),
            active_listeners: ObserverList::new(),
        }
    }

    fn active_slot(&self) -> MutexGuard<'_, Option<PeerIdentity>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Our own onion hostname, as reported by the backend.
    pub async fn own_hostname(&self) -> Result<PeerIdentity> {
        Ok(self.backend.hostname().await?)
    }

    /// Every stored chat with its nickname and current connection status.
    pub fn contacts(&self) -> Result<Vec<Contact>> {
        let data = self.storage.data().ok_or(ClientError::StorageNotLoaded)?;
        Ok(data
            .chats
            .into_values()
            .map(|chat| Contact {
                status: self
                    .registry
                    .lookup(&chat.receiver_onion)
                    .map(|conn| conn.status())
                    .unwrap_or_default(),
                peer: chat.receiver_onion,
                nickname: chat.nickname,
            })
            .collect())
    }

    /// Add a contact from user input.  Adding an existing contact changes
    /// nothing.  The first contact becomes the active chat.
    pub fn add_contact(&self, input: &str, nickname: Option<String>) -> Result<PeerIdentity> {
        let peer = PeerIdentity::parse(input)?;
        let nickname = nickname.filter(|n| !n.trim().is_empty());

        let added = self.storage.update(|data| {
            if data.chat(&peer).is_some() {
                return false;
            }
            data.chat_mut(&peer).nickname = nickname;
            true
        })?;

        if added {
            info!(peer = %peer.short(), "contact added");
        } else {
            debug!(peer = %peer.short(), "contact already exists");
        }

        if self.active_peer().is_none() {
            self.set_active(Some(peer.clone()));
        }
        Ok(peer)
    }

    /// Set or clear a contact's nickname.
    pub fn set_nickname(&self, peer: &PeerIdentity, nickname: Option<String>) -> Result<()> {
        let nickname = nickname.filter(|n| !n.trim().is_empty());
        self.storage
            .update(|data| data.chat_mut(peer).nickname = nickname)?;
        Ok(())
    }

    /// Delete the chat and drop its connection.
    pub fn remove_contact(&self, peer: &PeerIdentity) -> Result<bool> {
        let removed = self
            .storage
            .update(|data| data.remove_chat(peer).is_some())?;
        self.registry.remove(peer);

        if self.active_peer().as_ref() == Some(peer) {
            self.set_active(None);
        }
        if removed {
            info!(peer = %peer.short(), "contact removed");
        }
        Ok(removed)
    }

    /// Switch the open chat.  Listeners are told only when it changes.
    pub fn set_active(&self, peer: Option<PeerIdentity>) {
        {
            let mut active = self.active_slot();
            if *active == peer {
                return;
            }
            *active = peer.clone();
        }
        debug!(peer = ?peer.as_ref().map(|p| p.short()), "active chat changed");
        self.active_listeners.notify(&peer);
    }

    pub fn active_peer(&self) -> Option<PeerIdentity> {
        self.active_slot().clone()
    }

    /// Connection of the open chat.
    pub fn active(&self) -> Option<Arc<PeerConnection>> {
        self.active_peer().map(|peer| self.registry.get(&peer))
    }

    pub fn on_active_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Option<PeerIdentity>) + Send + Sync + 'static,
    {
        self.active_listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.active_listeners.remove(id)
    }

    fn require_active(&self) -> Result<Arc<PeerConnection>> {
        self.active().ok_or(ClientError::NoActivePeer)
    }

    pub async fn connect_active(&self) -> Result<()> {
        self.require_active()?.connect().await
    }

    pub async fn send_active(&self, text: &str) -> Result<i64> {
        self.require_active()?.send(text).await
    }

    pub fn active_messages(&self) -> Result<Vec<ChatMessage>> {
        self.require_active()?.load_messages()
    }
}
