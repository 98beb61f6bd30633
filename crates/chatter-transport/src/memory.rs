//! In-process transport.
//!
//! Every [`MemoryConnector::connect`] hands a fresh [`MemoryPeer`] to whoever
//! holds the peer receiver, which plays the hub's side of the connection.
//! Dropping the peer closes the connection from the hub side.

use async_trait::async_trait;
use chatter_protocol::{ClientFrame, ServerFrame};
use tokio::sync::mpsc;

use crate::traits::{Connection, Connector, TransportError};

/// Connector backed by in-process channels.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    /// Create a connector and the receiver of hub-side peers.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (Self { peers }, rx)
    }
}

/// The hub side of an in-process connection.
#[derive(Debug)]
pub struct MemoryPeer {
    events: mpsc::UnboundedSender<ServerFrame>,
    sent: mpsc::UnboundedReceiver<ClientFrame>,
}

impl MemoryPeer {
    /// Push an event to the client. Returns `false` if the client is gone.
    pub fn push(&self, frame: ServerFrame) -> bool {
        self.events.send(frame).is_ok()
    }

    /// Wait for the next event the client sent.
    pub async fn next_sent(&mut self) -> Option<ClientFrame> {
        self.sent.recv().await
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();

        self.peers
            .send(MemoryPeer {
                events: events_tx,
                sent: sent_rx,
            })
            .map_err(|_| TransportError::ConnectFailed("no hub listening".into()))?;

        Ok(Box::new(MemoryConnection {
            events: events_rx,
            sent: sent_tx,
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryConnection {
    events: mpsc::UnboundedReceiver<ServerFrame>,
    sent: mpsc::UnboundedSender<ClientFrame>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn recv(&mut self) -> Result<Option<ServerFrame>, TransportError> {
        Ok(self.events.recv().await)
    }

    async fn send(&mut self, frame: ClientFrame) -> Result<(), TransportError> {
        self.sent
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.events.close();
        Ok(())
    }
}
