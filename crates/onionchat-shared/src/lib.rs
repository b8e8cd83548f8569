// Domain types shared by the storage layer and the client core.

pub mod constants;
pub mod error;
pub mod identity;
pub mod types;

pub use error::IdentityError;
pub use identity::PeerIdentity;
pub use types::{now_millis, ChatMessage, ConnectionStatus, MessageStatus};
