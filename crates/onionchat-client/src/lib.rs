//! # onionchat-client
//!
//! Client side of onionchat's peer messaging: one [`PeerConnection`] per
//! onion peer, tracked by the [`Registry`], driven by events the backend
//! pushes through the [`EventDispatcher`], with chat history kept in sync by
//! [`StorageSync`].  [`ChatApp`] wires everything together.

pub mod backend;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod observers;
pub mod registry;
pub mod session;
pub mod state;
pub mod storage_sync;

#[cfg(test)]
mod test_support;

use tracing_subscriber::{fmt, EnvFilter};

pub use backend::{Backend, BackendError};
pub use config::ClientConfig;
pub use connection::{MessageUpdate, PeerConnection, ReceivedMessage};
pub use dispatcher::EventDispatcher;
pub use error::{ClientError, Result};
pub use events::BackendEvent;
pub use observers::{ListenerId, ObserverList};
pub use registry::Registry;
pub use session::{ChatSession, Contact};
pub use state::ChatApp;
pub use storage_sync::StorageSync;

/// Install the global `tracing` subscriber.  `RUST_LOG` overrides the
/// default filter.  Calling it again is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("onionchat_client=debug,onionchat_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    tracing::info!("onionchat client logging initialised");
}
