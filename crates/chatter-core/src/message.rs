//! Persisted direct messages.

use chatter_protocol::{MessageFrame, MessageId, UserId};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A message accepted by the relay but not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender: UserId,
    pub recipient: UserId,
    pub text: String,
}

/// A persisted message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub sender: UserId,
    pub recipient: UserId,
    pub text: String,
    /// Milliseconds since the Unix epoch, assigned by the store.
    #[serde(rename = "createdAt")]
    pub created_at: u64,
}

impl Message {
    /// Build the event forwarded to the recipient's transports.
    #[must_use]
    pub fn to_frame(&self) -> MessageFrame {
        MessageFrame {
            id: self.id,
            sender: self.sender.clone(),
            recipient: self.recipient.clone(),
            text: self.text.clone(),
            created_at: self.created_at,
        }
    }

    /// Get the conversation this message belongs to.
    #[must_use]
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(self.sender.clone(), self.recipient.clone())
    }
}

/// The unordered pair of users a message belongs to.
///
/// `ConversationKey::new(a, b) == ConversationKey::new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey(UserId, UserId);

impl ConversationKey {
    #[must_use]
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// Check whether `user` is one of the two participants.
    #[must_use]
    pub fn involves(&self, user: &UserId) -> bool {
        &self.0 == user || &self.1 == user
    }
}
