//! Message persistence.
//!
//! The store is the source of truth for messages: the relay writes here
//! before forwarding anything, and history is read back from here. It also
//! remembers every identity that has completed a handshake, which backs the
//! people listing.

pub mod memory;
pub mod sqlite;

use crate::identity::Identity;
use crate::message::{Message, NewMessage};
use async_trait::async_trait;
use chatter_protocol::UserId;
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store cannot be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// SQLite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Durable, append-only message storage.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message, assigning its ID and creation time.
    async fn save(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// All messages between `a` and `b`, in both directions, oldest first.
    async fn query(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StoreError>;

    /// Record that `identity` has connected, updating its username.
    async fn remember_user(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Every user ever seen, ordered by username.
    async fn known_users(&self) -> Result<Vec<Identity>, StoreError>;

    /// Get the backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &'static str;
}
