use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Transport status of a peer connection, as reported by the backend.
///
/// `Unknown` means no status was ever pushed for this peer. It is kept apart
/// from `Disconnected`, which means a connection was tried and lost or failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Unknown,
    Disconnected,
    ConnectingProxy,
    ConnectingHost,
    WaitingIdentity,
    Connected,
}

impl ConnectionStatus {
    /// Number of steps between "not connected" and `Connected`
    /// (proxy, host, identity check).
    pub const CONNECT_STEPS: u8 = 3;

    /// How many of the connect steps are finished.
    pub fn completed_steps(&self) -> u8 {
        match self {
            Self::Unknown | Self::Disconnected | Self::ConnectingProxy => 0,
            Self::ConnectingHost => 1,
            Self::WaitingIdentity => 2,
            Self::Connected => Self::CONNECT_STEPS,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// A connect attempt is under way.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            Self::ConnectingProxy | Self::ConnectingHost | Self::WaitingIdentity
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Delivery status of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    Sending,
    Sent,
    Success,
    Failed,
}

impl MessageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// `Sending -> {Sent, Success, Failed}`, `Sent -> {Success, Failed}`.
    /// Re-applying the current status is always allowed; nothing leaves a
    /// terminal state.
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Sending => true,
            Self::Sent => next.is_terminal(),
            Self::Success | Self::Failed => false,
        }
    }
}

/// One message of a conversation. `timestamp` is unique within a peer's
/// message list and correlates backend status updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: String,
    pub sent_by_self: bool,
    pub timestamp: i64,
    pub status: MessageStatus,
}

impl ChatMessage {
    /// A locally originated message awaiting delivery.
    pub fn outgoing(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            text: text.into(),
            sent_by_self: true,
            timestamp,
            status: MessageStatus::Sending,
        }
    }

    /// A message received from the peer.
    pub fn incoming(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            text: text.into(),
            sent_by_self: false,
            timestamp,
            status: MessageStatus::Success,
        }
    }
}
