//! # chatter-core
//!
//! Presence tracking and direct-message relay for the chatter hub.
//!
//! This crate provides the stateful heart of the server:
//!
//! - **Registry** - Which authenticated users are connected, on which transports
//! - **Presence** - Full online-set snapshots, broadcast on every registry change
//! - **Relay** - Persist an inbound message, then forward it to the recipient
//! - **Store** - Durable message history (SQLite or in-memory)
//! - **Identity** - Verified user identities and the verifier seam
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  register/   ┌─────────────┐  announce   ┌─────────────┐
//! │  Transport  │─────────────▶│  Registry   │────────────▶│  Presence   │
//! └─────────────┘  unregister  └─────────────┘             └─────────────┘
//!        │                            ▲ handles_for
//!        │ send event          ┌─────────────┐   save      ┌─────────────┐
//!        └────────────────────▶│    Relay    │────────────▶│    Store    │
//!                              └─────────────┘             └─────────────┘
//! ```

pub mod identity;
pub mod message;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod store;

pub use identity::{AuthError, Identity, IdentityVerifier};
pub use message::{ConversationKey, Message, NewMessage};
pub use presence::{announce, Announcement, PresenceSnapshot};
pub use registry::{
    ConnectedUser, ConnectionId, ConnectionRegistry, RegistryStats, TransportError,
    TransportHandle, DEFAULT_OUTBOUND_CAPACITY,
};
pub use relay::{Delivery, MessageRelay, RelayError};
pub use store::{MemoryStore, MessageStore, SqliteStore, StoreError};
