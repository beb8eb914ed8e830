//! Message payloads carried inside frames and envelopes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-local identifier of a client connection.
///
/// Serialized as a plain string so it can travel inside [`GroupMessage`]
/// and be compared by every server that receives the message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a connection ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A frame as sent by a client: a chat line addressed to one of its groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message text.
    pub message: String,
    /// Target group.
    pub group_id: String,
}

/// A chat message after the server has stamped the sender onto it.
///
/// This is the payload published on a group topic and the body of a
/// [`ClientEnvelope::Message`](crate::ClientEnvelope::Message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMessage {
    /// Message text.
    pub message: String,
    /// Target group.
    pub group_id: String,
    /// Connection the message originated from.
    pub client_id: ConnectionId,
    /// User that owns the originating connection.
    pub user_id: String,
}

impl GroupMessage {
    /// Stamp an inbound client frame with its sender.
    #[must_use]
    pub fn from_inbound(
        inbound: InboundMessage,
        client_id: ConnectionId,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            message: inbound.message,
            group_id: inbound.group_id,
            client_id,
            user_id: user_id.into(),
        }
    }
}

/// The complete set of groups a user now belongs to.
///
/// Full replacement, not a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupsBody {
    pub groups: Vec<String>,
}

impl GroupsBody {
    #[must_use]
    pub fn new(groups: Vec<String>) -> Self {
        Self { groups }
    }
}
