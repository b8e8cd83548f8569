//! Command surface of the backend.
//!
//! The backend owns Tor, the onion service and the WebSocket transport to
//! each peer.  The client only asks it to do things; every outcome comes back
//! later as a pushed event (see [`crate::events`]).

use async_trait::async_trait;
use thiserror::Error;

use onionchat_shared::PeerIdentity;

/// The request never reached the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend process or bridge could not be reached.
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// The backend refused the request.
    #[error("Backend rejected request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Ask the backend to establish transport to `peer`.  Resolves once the
    /// request is accepted, not when the connection is up.
    async fn connect(&self, peer: &PeerIdentity) -> Result<(), BackendError>;

    /// Ask the backend to deliver `text` to `peer`.  `timestamp` is the
    /// message key the backend uses in its status updates.
    async fn send(&self, peer: &PeerIdentity, text: &str, timestamp: i64)
        -> Result<(), BackendError>;

    /// Hostname of the local onion service.
    async fn hostname(&self) -> Result<PeerIdentity, BackendError>;
}
