//! Routes backend-pushed events to peer connections.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use onionchat_shared::ConnectionStatus;

use crate::events::{BackendEvent, ClientStatusUpdate};
use crate::observers::{ListenerId, ObserverList};
use crate::registry::Registry;
use crate::storage_sync::StorageSync;

pub struct EventDispatcher {
    registry: Arc<Registry>,
    storage: Arc<StorageSync>,
    any_client: ObserverList<ClientStatusUpdate>,
}

impl EventDispatcher {
    pub fn new(registry: Arc<Registry>, storage: Arc<StorageSync>) -> Self {
        Self {
            registry,
            storage,
            any_client: ObserverList::new(),
        }
    }

    /// Listen to status updates of every peer, with the full payload.
    pub fn on_any_client_update<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ClientStatusUpdate) + Send + Sync + 'static,
    {
        self.any_client.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.any_client.remove(id)
    }

    pub async fn dispatch(&self, event: BackendEvent) {
        match event {
            BackendEvent::ClientStatusUpdate(update) => {
                // Peers may connect to us, so an unknown peer gets a connection.
                self.registry.get(&update.peer_id).apply_status(update.status);
                self.any_client.notify(&update);

                if update.teardown && update.status == ConnectionStatus::Disconnected {
                    info!(peer = %update.peer_id.short(), "peer torn down");
                    self.registry.remove(&update.peer_id);
                }
            }

            BackendEvent::MessageReceived(payload) => {
                self.registry.get(&payload.peer_id).handle_received(&payload);
            }

            BackendEvent::MessageStatusUpdate(payload) => {
                self.registry
                    .get(&payload.peer_id)
                    .update_message_status(payload.timestamp, payload.status)
                    .await;
            }

            BackendEvent::StorageDirty => {
                if let Err(e) = self.storage.refresh_with_retry().await {
                    warn!(error = %e, "failed to refresh storage after external change");
                }
            }
        }
    }

    /// Decode and dispatch an event in the bridge's raw form.  Unknown events
    /// and bad payloads are logged and dropped.
    pub async fn dispatch_raw(&self, name: &str, payload: serde_json::Value) {
        match BackendEvent::from_raw(name, payload) {
            Ok(event) => self.dispatch(event).await,
            Err(e) => warn!(event = name, error = %e, "dropping backend event"),
        }
    }

    /// Process events one at a time until the channel closes.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<BackendEvent>) {
        info!("backend event dispatcher started");

        while let Some(event) = events.recv().await {
            debug!(event = event.name(), peer = ?event.peer().map(|p| p.short()), "backend event");
            self.dispatch(event).await;
        }

        info!("backend event channel closed, dispatcher stopped");
    }
}
