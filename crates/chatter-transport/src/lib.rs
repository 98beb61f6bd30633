//! # chatter-transport
//!
//! Client-side transport abstraction for chatter.
//!
//! A [`Connector`] knows how to open one authenticated connection to the hub;
//! each [`Connection`] it returns exchanges typed events until it closes. The
//! session controller in `chatter-client` only talks to these traits, so it
//! can be driven by an in-process fake in tests.
//!
//! - **WebSocket** - JSON text frames, credential presented as a `token` cookie
//! - **Memory** - in-process channel pair, for tests and embedding
//!
//! ```rust,ignore
//! use chatter_transport::{Connector, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("ws://127.0.0.1:8080/ws", token);
//! let mut conn = connector.connect().await?;
//! while let Some(event) = conn.recv().await? {
//!     // Handle event
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryConnector, MemoryPeer};
pub use traits::{Connection, Connector, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;
