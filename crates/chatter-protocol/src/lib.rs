//! # chatter-protocol
//!
//! Wire events exchanged between chatter clients and the hub.
//!
//! Every event travels as a single JSON text frame over a persistent
//! bidirectional connection. There is no envelope or type tag: the shape of
//! the object identifies the event.
//!
//! ## Events
//!
//! - `{ "online": [ { "userId", "username" }, ... ] }` - server to client presence
//! - `{ "recipient", "text" }` - client to server direct message
//! - `{ "_id", "sender", "recipient", "text", "createdAt" }` - server to client message
//!
//! ## Example
//!
//! ```rust
//! use chatter_protocol::{codec, ClientFrame, UserId};
//!
//! let frame = ClientFrame::send(UserId::new("bob"), "hi");
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded: ClientFrame = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, FrameCodec, ProtocolError};
pub use frames::{ClientFrame, MessageFrame, MessageId, PresenceEntry, ServerFrame, UserId};
