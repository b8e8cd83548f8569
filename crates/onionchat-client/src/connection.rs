//! One peer's connection: transport status plus the message cache.
//!
//! The status is never computed locally.  It only changes when the backend
//! pushes an update, which is applied as-is and then announced to listeners.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use onionchat_shared::{now_millis, ChatMessage, ConnectionStatus, MessageStatus, PeerIdentity};
use onionchat_store::merge_messages;

use crate::backend::Backend;
use crate::error::{ClientError, Result};
use crate::events::MessageReceivedPayload;
use crate::observers::{ListenerId, ObserverList};
use crate::storage_sync::StorageSync;

/// Payload of the receive listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub peer: PeerIdentity,
    pub text: String,
    pub timestamp: i64,
}

/// Payload of the message-update listeners.  `message` is `None` when the
/// timestamp could not be found even after a reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageUpdate {
    pub peer: PeerIdentity,
    pub timestamp: i64,
    pub message: Option<ChatMessage>,
}

#[derive(Default)]
struct ConnectionState {
    status: ConnectionStatus,
    /// `None` until loaded from storage.
    messages: Option<Vec<ChatMessage>>,
    destroyed: bool,
}

impl ConnectionState {
    /// Unique key for a new entry: the current time, bumped past the newest
    /// cached timestamp.  `None` once that timestamp is `i64::MAX`.
    fn next_timestamp(&self) -> Option<i64> {
        let newest = self.messages.iter().flatten().map(|m| m.timestamp).max();
        match newest {
            Some(last) => Some(now_millis().max(last.checked_add(1)?)),
            None => Some(now_millis()),
        }
    }

    /// Apply `status` to the cached entry with `timestamp`, if present.
    /// Returns the entry as it is afterwards.
    fn apply_message_status(
        &mut self,
        peer: &PeerIdentity,
        timestamp: i64,
        status: MessageStatus,
    ) -> Option<ChatMessage> {
        let message = self
            .messages
            .as_mut()?
            .iter_mut()
            .find(|m| m.timestamp == timestamp)?;

        if message.status.can_transition_to(status) {
            message.status = status;
        } else {
            debug!(
                peer = %peer.short(),
                timestamp,
                current = ?message.status,
                ignored = ?status,
                "message already in a final state"
            );
        }
        Some(message.clone())
    }
}

pub struct PeerConnection {
    peer: PeerIdentity,
    backend: Arc<dyn Backend>,
    storage: Arc<StorageSync>,
    state: Mutex<ConnectionState>,
    status_listeners: ObserverList<ConnectionStatus>,
    receive_listeners: ObserverList<ReceivedMessage>,
    update_listeners: ObserverList<MessageUpdate>,
}

impl PeerConnection {
    pub fn new(peer: PeerIdentity, backend: Arc<dyn Backend>, storage: Arc<StorageSync>) -> Self {
        Self {
            peer,
            backend,
            storage,
            state: Mutex::new(ConnectionState::default()),
            status_listeners: ObserverList::new(),
            receive_listeners: ObserverList::new(),
            update_listeners: ObserverList::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state().status
    }

    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }

    /// Whether the message cache has been populated.
    pub fn is_loaded(&self) -> bool {
        self.state().messages.is_some()
    }

    /// Snapshot of the message cache (empty before it is loaded).
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state().messages.clone().unwrap_or_default()
    }

    /// Populate the cache from the storage document on first use, then
    /// return it.
    pub fn load_messages(&self) -> Result<Vec<ChatMessage>> {
        let mut state = self.state();
        if let Some(messages) = &state.messages {
            return Ok(messages.clone());
        }
        let messages = self
            .storage
            .messages(&self.peer)
            .ok_or(ClientError::StorageNotLoaded)?;
        debug!(peer = %self.peer.short(), count = messages.len(), "message cache loaded");
        state.messages = Some(messages.clone());
        Ok(messages)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(ClientError::Destroyed(self.peer.to_string()));
        }
        Ok(())
    }

    /// Write `message` into the storage document, replacing the entry with
    /// the same timestamp.  The storage writer persists it later.
    fn persist(&self, message: &ChatMessage) {
        let result = self.storage.update(|data| {
            let messages = &mut data.chat_mut(&self.peer).messages;
            match messages.iter_mut().find(|m| m.timestamp == message.timestamp) {
                Some(existing) => *existing = message.clone(),
                None => messages.push(message.clone()),
            }
        });
        if let Err(e) = result {
            warn!(
                peer = %self.peer.short(),
                timestamp = message.timestamp,
                error = %e,
                "failed to record message in storage"
            );
        }
    }

    /// Ask the backend to connect.  Progress arrives as status updates.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_alive()?;
        self.peer.validate()?;

        info!(peer = %self.peer.short(), "requesting connection");
        self.backend.connect(&self.peer).await?;
        Ok(())
    }

    /// Queue `text` for delivery and return the timestamp that keys it.
    ///
    /// The message shows up in the cache as `Sending` right away.  If the
    /// request cannot be handed to the backend it is marked `Failed` and the
    /// error is returned.
    pub async fn send(&self, text: &str) -> Result<i64> {
        self.ensure_alive()?;
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        self.load_messages()?;

        let message = {
            let mut state = self.state();
            let timestamp = state
                .next_timestamp()
                .ok_or_else(|| ClientError::TimestampExhausted(self.peer.to_string()))?;
            let message = ChatMessage::outgoing(text, timestamp);
            state.messages.get_or_insert_with(Vec::new).push(message.clone());
            message
        };
        let timestamp = message.timestamp;
        self.persist(&message);
        self.update_listeners.notify(&MessageUpdate {
            peer: self.peer.clone(),
            timestamp,
            message: Some(message),
        });

        let dispatched = match self.peer.validate() {
            Ok(()) => self
                .backend
                .send(&self.peer, text, timestamp)
                .await
                .map_err(ClientError::from),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = dispatched {
            warn!(peer = %self.peer.short(), timestamp, error = %e, "failed to dispatch message");
            let failed = self
                .state()
                .apply_message_status(&self.peer, timestamp, MessageStatus::Failed);
            if let Some(failed) = &failed {
                self.persist(failed);
            }
            self.update_listeners.notify(&MessageUpdate {
                peer: self.peer.clone(),
                timestamp,
                message: failed,
            });
            return Err(e);
        }

        debug!(peer = %self.peer.short(), timestamp, "message dispatched");
        Ok(timestamp)
    }

    /// Record a status pushed by the backend and notify listeners.  The same
    /// status twice is announced twice.
    pub fn apply_status(&self, status: ConnectionStatus) {
        let previous = {
            let mut state = self.state();
            std::mem::replace(&mut state.status, status)
        };
        debug!(peer = %self.peer.short(), ?previous, ?status, "connection status");
        self.status_listeners.notify(&status);
    }

    /// Handle an incoming message pushed by the backend.
    pub fn handle_received(&self, payload: &MessageReceivedPayload) {
        let received = {
            let mut state = self.state();
            let Some(timestamp) = payload.timestamp.or_else(|| state.next_timestamp()) else {
                warn!(peer = %self.peer.short(), "no timestamp left for incoming message, dropped");
                return;
            };

            if let Some(messages) = state.messages.as_mut() {
                if !messages.iter().any(|m| m.timestamp == timestamp) {
                    messages.push(ChatMessage::incoming(payload.text.clone(), timestamp));
                }
            }

            ReceivedMessage {
                peer: self.peer.clone(),
                text: payload.text.clone(),
                timestamp,
            }
        };
        debug!(peer = %self.peer.short(), timestamp = received.timestamp, "message received");

        let known = self
            .storage
            .messages(&self.peer)
            .is_some_and(|stored| stored.iter().any(|m| m.timestamp == received.timestamp));
        if !known {
            self.persist(&ChatMessage::incoming(received.text.clone(), received.timestamp));
        }

        self.receive_listeners.notify(&received);
    }

    /// Apply a delivery status pushed by the backend.
    ///
    /// A timestamp that is not in the cache (or a cache that was never
    /// loaded) triggers exactly one reload of the peer's messages from
    /// storage.  Listeners are notified in every case.
    pub async fn update_message_status(
        &self,
        timestamp: i64,
        status: MessageStatus,
    ) -> Option<ChatMessage> {
        let hit = self
            .state()
            .apply_message_status(&self.peer, timestamp, status);

        let message = match hit {
            Some(message) => Some(message),
            None => {
                debug!(peer = %self.peer.short(), timestamp, "unknown message, reloading");
                match self.storage.fetch_messages(&self.peer).await {
                    Ok(fetched) => {
                        let mut state = self.state();
                        // In-flight sends storage has not seen yet survive the reload.
                        let in_flight: Vec<ChatMessage> = state
                            .messages
                            .take()
                            .unwrap_or_default()
                            .into_iter()
                            .filter(|m| m.status == MessageStatus::Sending)
                            .filter(|m| !fetched.iter().any(|f| f.timestamp == m.timestamp))
                            .collect();
                        state.messages = Some(merge_messages(in_flight, fetched));
                        state.apply_message_status(&self.peer, timestamp, status)
                    }
                    Err(e) => {
                        warn!(
                            peer = %self.peer.short(),
                            timestamp,
                            error = %e,
                            "failed to reload messages, keeping cache"
                        );
                        None
                    }
                }
            }
        };

        match &message {
            Some(message) => self.persist(message),
            None => {
                debug!(peer = %self.peer.short(), timestamp, "status update for a message not in storage")
            }
        }

        self.update_listeners.notify(&MessageUpdate {
            peer: self.peer.clone(),
            timestamp,
            message: message.clone(),
        });
        message
    }

    pub fn on_status_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.status_listeners.add(listener)
    }

    pub fn on_receive<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ReceivedMessage) + Send + Sync + 'static,
    {
        self.receive_listeners.add(listener)
    }

    pub fn on_message_update<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&MessageUpdate) + Send + Sync + 'static,
    {
        self.update_listeners.add(listener)
    }

    /// Remove a listener from whichever list holds it.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.status_listeners.remove(id)
            || self.receive_listeners.remove(id)
            || self.update_listeners.remove(id)
    }

    /// Drop every listener and detach from the backend.  Idempotent.
    pub fn destroy(&self) {
        {
            let mut state = self.state();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
        }
        self.status_listeners.clear();
        self.receive_listeners.clear();
        self.update_listeners.clear();
        debug!(peer = %self.peer.short(), "connection destroyed");
    }
}
