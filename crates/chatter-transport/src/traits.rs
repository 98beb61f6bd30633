//! Transport abstraction traits for chatter clients.

use async_trait::async_trait;
use chatter_protocol::{ClientFrame, ServerFrame};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Could not establish the connection.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] chatter_protocol::ProtocolError),
}

/// Opens connections to the hub.
///
/// Called again by the session controller after every disconnect.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new authenticated connection.
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the transport name (e.g., "websocket", "memory").
    fn name(&self) -> &'static str;
}

/// An open connection to the hub.
#[async_trait]
pub trait Connection: Send {
    /// Receive the next event.
    ///
    /// Returns `None` once the connection is closed cleanly.
    async fn recv(&mut self) -> Result<Option<ServerFrame>, TransportError>;

    /// Send an event.
    async fn send(&mut self, frame: ClientFrame) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}
