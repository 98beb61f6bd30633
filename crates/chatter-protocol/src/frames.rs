//! Event types for the chatter wire protocol.
//!
//! Field names follow the JSON the browser client has always spoken
//! (`userId`, `_id`, `createdAt`), so the Rust names are mapped with serde
//! renames rather than exposed as-is.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a user, as carried in the verified credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Create a new user ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier assigned to a message by the store when it is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One user in a presence event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresenceEntry {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub username: String,
}

/// A persisted direct message as forwarded to a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFrame {
    /// Store-assigned identifier, used by clients as the dedup key.
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub sender: UserId,
    pub recipient: UserId,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "createdAt", default)]
    pub created_at: u64,
}

/// Events sent from the hub to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// Full set of currently connected users.
    Presence {
        online: Vec<PresenceEntry>,
    },

    /// A direct message addressed to the receiving user.
    Message(MessageFrame),
}

impl ServerFrame {
    /// Create a presence event.
    #[must_use]
    pub fn presence(online: Vec<PresenceEntry>) -> Self {
        ServerFrame::Presence { online }
    }

    /// Get the event name, for logs and metrics labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Presence { .. } => "presence",
            ServerFrame::Message(_) => "message",
        }
    }
}

impl From<MessageFrame> for ServerFrame {
    fn from(frame: MessageFrame) -> Self {
        ServerFrame::Message(frame)
    }
}

/// A direct message sent by a client.
///
/// Both fields are optional on the wire so a malformed send can be reported
/// as a validation failure instead of a decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ClientFrame {
    /// Create a send event.
    #[must_use]
    pub fn send(recipient: UserId, text: impl Into<String>) -> Self {
        Self {
            recipient: Some(recipient),
            text: Some(text.into()),
        }
    }
}
