//! In-memory message store.

use super::{MessageStore, StoreError};
use crate::identity::Identity;
use crate::message::{now_millis, ConversationKey, Message, NewMessage};
use async_trait::async_trait;
use chatter_protocol::{MessageId, UserId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A store that keeps everything in process memory.
///
/// Conversations are sharded by pair, so writes to unrelated conversations
/// do not contend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: DashMap<ConversationKey, Vec<Message>>,
    users: DashMap<UserId, String>,
    last_id: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.conversations.iter().map(|c| c.len()).sum()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn save(&self, message: NewMessage) -> Result<Message, StoreError> {
        let key = ConversationKey::new(message.sender.clone(), message.recipient.clone());
        let mut conversation = self.conversations.entry(key).or_default();

        // Assigned under the shard lock so IDs ascend within a conversation
        let id = MessageId(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
        let stored = Message {
            id,
            sender: message.sender,
            recipient: message.recipient,
            text: message.text,
            created_at: now_millis(),
        };
        conversation.push(stored.clone());

        Ok(stored)
    }

    async fn query(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StoreError> {
        let key = ConversationKey::new(a.clone(), b.clone());
        let mut messages = self
            .conversations
            .get(&key)
            .map(|c| c.value().clone())
            .unwrap_or_default();
        messages.sort_by_key(|m| (m.created_at, m.id));
        Ok(messages)
    }

    async fn remember_user(&self, identity: &Identity) -> Result<(), StoreError> {
        self.users
            .insert(identity.user_id.clone(), identity.username.clone());
        Ok(())
    }

    async fn known_users(&self) -> Result<Vec<Identity>, StoreError> {
        let mut users: Vec<Identity> = self
            .users
            .iter()
            .map(|e| Identity::new(e.key().clone(), e.value().clone()))
            .collect();
        users.sort_by(|x, y| x.username.cmp(&y.username));
        Ok(users)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
