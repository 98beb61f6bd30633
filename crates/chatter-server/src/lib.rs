//! # chatter-server
//!
//! The hub: an axum server that admits authenticated WebSocket transports
//! into the connection registry, relays direct messages between them, and
//! serves a small read-only HTTP API over the message store.
//!
//! The binary is `chatter`; the library exists so the router can be built
//! and served from integration tests.

pub mod api;
pub mod auth;
pub mod config;
pub mod handlers;
pub mod metrics;

pub use self::auth::{issue_token, JwtVerifier};
pub use self::config::Config;
pub use self::handlers::{build_router, run_server, serve, AppState};
