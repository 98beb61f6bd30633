//! The message relay.
//!
//! Relaying a message means persisting it and then forwarding it to every
//! live transport of the recipient. Persistence is authoritative: once the
//! store accepts a message the relay succeeds, whether or not anyone was
//! online to receive it.

use crate::identity::AuthError;
use crate::message::{Message, NewMessage};
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::store::{MessageStore, StoreError};
use chatter_protocol::{ClientFrame, ServerFrame};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The sending transport has no verified identity.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// The send event is malformed. Nothing was persisted.
    #[error("Invalid message: {0}")]
    Validation(&'static str),

    /// The message could not be persisted. Nothing was forwarded.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl RelayError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Auth(_) => "auth",
            RelayError::Validation(_) => "validation",
            RelayError::Storage(_) => "storage",
        }
    }
}

/// Result of a successful relay.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The persisted message.
    pub message: Message,
    /// Number of recipient transports the message was queued on.
    pub forwarded: usize,
}

/// Persists inbound direct messages and forwards them to recipients.
#[derive(Clone)]
pub struct MessageRelay {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn MessageStore>,
}

impl MessageRelay {
    /// Create a relay over a registry and a store.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn MessageStore>) -> Self {
        Self { registry, store }
    }

    /// Get the store this relay writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Relay a send event received on `sender`.
    ///
    /// The message is never echoed to the sender's own transports.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Auth`] if `sender` is not a registered transport.
    /// - [`RelayError::Validation`] if the recipient is missing or the text
    ///   is empty.
    /// - [`RelayError::Storage`] if the store rejects the write.
    pub async fn relay(
        &self,
        sender: &ConnectionId,
        frame: ClientFrame,
    ) -> Result<Delivery, RelayError> {
        let identity = self
            .registry
            .identity_of(sender)
            .ok_or(AuthError::Unauthenticated)?;

        let recipient = frame
            .recipient
            .filter(|r| !r.as_str().is_empty())
            .ok_or(RelayError::Validation("missing recipient"))?;
        let text = frame
            .text
            .filter(|t| !t.is_empty())
            .ok_or(RelayError::Validation("empty text"))?;

        let message = self
            .store
            .save(NewMessage {
                sender: identity.user_id,
                recipient,
                text,
            })
            .await?;

        let event = Arc::new(ServerFrame::Message(message.to_frame()));
        let mut forwarded = 0;
        for handle in self.registry.handles_for(&message.recipient) {
            match handle.send(Arc::clone(&event)) {
                Ok(()) => forwarded += 1,
                Err(e) => {
                    warn!(connection = %handle.id(), error = %e, "Message forward failed");
                }
            }
        }

        debug!(
            connection = %sender,
            message = %message.id,
            recipient = %message.recipient,
            forwarded,
            "Relayed"
        );

        Ok(Delivery { message, forwarded })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::registry::TransportHandle;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chatter_protocol::{MessageFrame, UserId};
    use tokio::sync::mpsc;

    struct Hub {
        registry: Arc<ConnectionRegistry>,
        store: Arc<MemoryStore>,
        relay: MessageRelay,
    }

    fn hub() -> Hub {
        let registry = Arc::new(ConnectionRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let relay = MessageRelay::new(Arc::clone(&registry), store.clone());
        Hub {
            registry,
            store,
            relay,
        }
    }

    fn connect(
        hub: &Hub,
        conn: &str,
        user: &str,
        name: &str,
    ) -> mpsc::Receiver<Arc<ServerFrame>> {
        let (handle, rx) = TransportHandle::channel(ConnectionId::new(conn), 16);
        hub.registry.register(Identity::new(user, name), handle);
        rx
    }

    /// Drain everything queued and return only message events.
    fn messages(rx: &mut mpsc::Receiver<Arc<ServerFrame>>) -> Vec<MessageFrame> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let ServerFrame::Message(m) = &*frame {
                out.push(m.clone());
            }
        }
        out
    }

    #[tokio::test]
    async fn test_relay_to_online_recipient() {
        let hub = hub();
        let mut alice_rx = connect(&hub, "a1", "alice-id", "alice");
        let mut bob_rx = connect(&hub, "b1", "bob-id", "bob");

        let delivery = hub
            .relay
            .relay(&"a1".into(), ClientFrame::send("bob-id".into(), "hi"))
            .await
            .unwrap();
        assert_eq!(delivery.forwarded, 1);

        let received = messages(&mut bob_rx);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].sender.as_str(), "alice-id");
        assert_eq!(received[0].recipient.as_str(), "bob-id");
        assert_eq!(received[0].text, "hi");
        assert_eq!(received[0].id, delivery.message.id);

        // No echo to the sender
        assert!(messages(&mut alice_rx).is_empty());

        let history = hub
            .store
            .query(&"alice-id".into(), &"bob-id".into())
            .await
            .unwrap();
        assert_eq!(history, vec![delivery.message]);
    }

    #[tokio::test]
    async fn test_relay_to_offline_recipient_persists() {
        let hub = hub();
        let mut alice_rx = connect(&hub, "a1", "alice-id", "alice");

        let delivery = hub
            .relay
            .relay(&"a1".into(), ClientFrame::send("carol-id".into(), "later"))
            .await
            .unwrap();

        assert_eq!(delivery.forwarded, 0);
        assert!(messages(&mut alice_rx).is_empty());
        assert_eq!(hub.store.message_count(), 1);
    }

    #[tokio::test]
    async fn test_relay_fans_out_to_every_tab() {
        let hub = hub();
        let _alice_rx = connect(&hub, "a1", "alice-id", "alice");
        let mut tab1 = connect(&hub, "b1", "bob-id", "bob");
        let mut tab2 = connect(&hub, "b2", "bob-id", "bob");

        hub.relay
            .relay(&"a1".into(), ClientFrame::send("bob-id".into(), "both"))
            .await
            .unwrap();

        let m1 = messages(&mut tab1);
        let m2 = messages(&mut tab2);
        assert_eq!(m1.len(), 1);
        assert_eq!(m1, m2);
    }

    #[tokio::test]
    async fn test_relay_from_unregistered_transport() {
        let hub = hub();
        let err = hub
            .relay
            .relay(&"anonymous".into(), ClientFrame::send("bob-id".into(), "hi"))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Auth(AuthError::Unauthenticated)));
        assert_eq!(hub.store.message_count(), 0);
    }

    #[tokio::test]
    async fn test_relay_validation() {
        let hub = hub();
        let _rx = connect(&hub, "a1", "alice-id", "alice");

        let empty_text = hub
            .relay
            .relay(&"a1".into(), ClientFrame::send("bob-id".into(), ""))
            .await
            .unwrap_err();
        assert_eq!(empty_text.kind(), "validation");

        let no_recipient = hub
            .relay
            .relay(
                &"a1".into(),
                ClientFrame {
                    recipient: None,
                    text: Some("hello?".into()),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(no_recipient.kind(), "validation");

        assert_eq!(hub.store.message_count(), 0);
    }

    #[tokio::test]
    async fn test_relay_preserves_order_per_sender() {
        let hub = hub();
        let _alice_rx = connect(&hub, "a1", "alice-id", "alice");
        let mut bob_rx = connect(&hub, "b1", "bob-id", "bob");

        for i in 0..5 {
            hub.relay
                .relay(&"a1".into(), ClientFrame::send("bob-id".into(), format!("m{i}")))
                .await
                .unwrap();
        }

        let texts: Vec<String> = messages(&mut bob_rx).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_forward_failure_keeps_message() {
        let hub = hub();
        let _alice_rx = connect(&hub, "a1", "alice-id", "alice");
        let bob_rx = connect(&hub, "b1", "bob-id", "bob");
        drop(bob_rx);

        let delivery = hub
            .relay
            .relay(&"a1".into(), ClientFrame::send("bob-id".into(), "lost?"))
            .await
            .unwrap();

        assert_eq!(delivery.forwarded, 0);
        assert_eq!(hub.store.message_count(), 1);
        assert!(hub.registry.handles_for(&"bob-id".into())[0].is_evicted());
    }

    struct UnavailableStore;

    #[async_trait]
    impl MessageStore for UnavailableStore {
        async fn save(&self, _message: NewMessage) -> Result<Message, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn query(&self, _a: &UserId, _b: &UserId) -> Result<Vec<Message>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn remember_user(&self, _identity: &Identity) -> Result<(), StoreError> {
            Ok(())
        }

        async fn known_users(&self) -> Result<Vec<Identity>, StoreError> {
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "unavailable"
        }
    }

    #[tokio::test]
    async fn test_storage_failure_forwards_nothing() {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = MessageRelay::new(Arc::clone(&registry), Arc::new(UnavailableStore));

        let (alice, _alice_rx) = TransportHandle::channel(ConnectionId::new("a1"), 16);
        let (bob, mut bob_rx) = TransportHandle::channel(ConnectionId::new("b1"), 16);
        registry.register(Identity::new("alice-id", "alice"), alice);
        registry.register(Identity::new("bob-id", "bob"), bob);

        let err = relay
            .relay(&"a1".into(), ClientFrame::send("bob-id".into(), "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "storage");
        assert!(messages(&mut bob_rx).is_empty());
    }
}
