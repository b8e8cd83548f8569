//! Registry of live peer connections, one per identity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use onionchat_shared::PeerIdentity;

use crate::backend::Backend;
use crate::connection::PeerConnection;
use crate::storage_sync::StorageSync;

pub struct Registry {
    backend: Arc<dyn Backend>,
    storage: Arc<StorageSync>,
    connections: Mutex<HashMap<PeerIdentity, Arc<PeerConnection>>>,
}

impl Registry {
    pub fn new(backend: Arc<dyn Backend>, storage: Arc<StorageSync>) -> Self {
        Self {
            backend,
            storage,
            connections: Mutex::new(HashMap::new()),
        }
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<PeerIdentity, Arc<PeerConnection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The connection for `peer`, created on first use.  Peer-scoped backend
    /// events are routed to whatever this returns.
    pub fn get(&self, peer: &PeerIdentity) -> Arc<PeerConnection> {
        let mut connections = self.connections();
        if let Some(existing) = connections.get(peer) {
            return Arc::clone(existing);
        }

        debug!(peer = %peer.short(), "creating connection");
        let connection = Arc::new(PeerConnection::new(
            peer.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.storage),
        ));
        connections.insert(peer.clone(), Arc::clone(&connection));
        connection
    }

    /// The connection for `peer` if one exists.
    pub fn lookup(&self, peer: &PeerIdentity) -> Option<Arc<PeerConnection>> {
        self.connections().get(peer).cloned()
    }

    /// Destroy and forget the connection for `peer`.
    pub fn remove(&self, peer: &PeerIdentity) -> bool {
        let removed = self.connections().remove(peer);
        match removed {
            Some(connection) => {
                connection.destroy();
                debug!(peer = %peer.short(), "connection removed");
                true
            }
            None => false,
        }
    }

    /// Registered peers, sorted.
    pub fn peers(&self) -> Vec<PeerIdentity> {
        let mut peers: Vec<PeerIdentity> = self.connections().keys().cloned().collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.connections().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
