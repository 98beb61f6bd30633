//! The connection registry.
//!
//! The registry is the only shared mutable state in the hub. It maps each
//! live, authenticated transport to the identity it was admitted with. All
//! mutations and reads go through a single lock, and every mutation
//! re-announces presence while the lock is still held, so each transport's
//! outbound queue sees presence snapshots in registry order.

use crate::identity::Identity;
use crate::message::now_millis;
use crate::presence::{self, PresenceSnapshot};
use chatter_protocol::{ServerFrame, UserId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Default capacity of a transport's outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let counter = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", now_millis(), counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Errors raised when sending to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport's worker has gone away.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The outbound queue is full; the peer is not keeping up.
    #[error("Outbound queue full")]
    QueueFull,

    /// The transport was already evicted.
    #[error("Connection evicted")]
    Evicted,
}

#[derive(Debug, Default)]
struct Eviction {
    flag: AtomicBool,
    notify: Notify,
}

/// Sending half of one live transport.
///
/// Cloning is cheap; all clones refer to the same transport. Sends never
/// block: a full or closed queue evicts the handle, which wakes the owning
/// worker through [`TransportHandle::evicted`]. The worker is then the only
/// party that unregisters it.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<Arc<ServerFrame>>,
    eviction: Arc<Eviction>,
}

impl TransportHandle {
    /// Create a handle and the receiver its worker drains.
    #[must_use]
    pub fn channel(
        id: ConnectionId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<ServerFrame>>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id,
            outbound,
            eviction: Arc::default(),
        };
        (handle, rx)
    }

    /// Get the transport's identifier.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error, and evicts the handle, if the queue is full or the
    /// receiver is gone.
    pub fn send(&self, frame: Arc<ServerFrame>) -> Result<(), TransportError> {
        if self.is_evicted() {
            return Err(TransportError::Evicted);
        }

        match self.outbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.evict();
                Err(TransportError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.evict();
                Err(TransportError::ConnectionClosed)
            }
        }
    }

    /// Mark the transport dead and wake its worker.
    pub fn evict(&self) {
        if !self.eviction.flag.swap(true, Ordering::SeqCst) {
            debug!(connection = %self.id, "Transport evicted");
            self.eviction.notify.notify_one();
        }
    }

    /// Check if the transport has been evicted.
    #[must_use]
    pub fn is_evicted(&self) -> bool {
        self.eviction.flag.load(Ordering::SeqCst)
    }

    /// Wait until the transport is evicted.
    pub async fn evicted(&self) {
        while !self.is_evicted() {
            self.eviction.notify.notified().await;
        }
    }
}

/// A registry entry: one authenticated, live transport.
#[derive(Debug, Clone)]
pub struct ConnectedUser {
    pub identity: Identity,
    pub handle: TransportHandle,
    /// Admission time in milliseconds since the Unix epoch.
    pub connected_at: u64,
}

/// Registry statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of registered transports.
    pub connection_count: usize,
    /// Number of distinct users online.
    pub user_count: usize,
}

/// Authoritative map of connected users to their transports.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<ConnectionId, ConnectedUser>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, ConnectedUser>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, ConnectedUser>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a transport for `identity` and announce the new presence set.
    ///
    /// A user may hold any number of transports; each call adds an
    /// independent entry. Registering the same handle twice replaces the
    /// earlier entry.
    pub fn register(&self, identity: Identity, handle: TransportHandle) {
        let mut entries = self.write();
        let connection = handle.id().clone();

        info!(
            connection = %connection,
            user = %identity.user_id,
            username = %identity.username,
            "Registered"
        );

        let entry = ConnectedUser {
            identity,
            handle,
            connected_at: now_millis(),
        };
        if entries.insert(connection.clone(), entry).is_some() {
            warn!(connection = %connection, "Handle was already registered; replaced");
        }

        presence::announce(&entries);
    }

    /// Remove the entry for `connection` and announce the new presence set.
    ///
    /// Idempotent: unregistering an unknown handle changes nothing and
    /// broadcasts nothing.
    pub fn unregister(&self, connection: &ConnectionId) -> Option<ConnectedUser> {
        let mut entries = self.write();
        let removed = entries.remove(connection)?;

        info!(
            connection = %connection,
            user = %removed.identity.user_id,
            "Unregistered"
        );

        presence::announce(&entries);
        Some(removed)
    }

    /// Current set of online users, one entry per user.
    #[must_use]
    pub fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot::from_connections(&self.read())
    }

    /// All live handles of `user`.
    #[must_use]
    pub fn handles_for(&self, user: &UserId) -> Vec<TransportHandle> {
        self.read()
            .values()
            .filter(|entry| &entry.identity.user_id == user)
            .map(|entry| entry.handle.clone())
            .collect()
    }

    /// Identity a transport was admitted with, if it is registered.
    #[must_use]
    pub fn identity_of(&self, connection: &ConnectionId) -> Option<Identity> {
        self.read()
            .get(connection)
            .map(|entry| entry.identity.clone())
    }

    /// Check if a transport is registered.
    #[must_use]
    pub fn contains(&self, connection: &ConnectionId) -> bool {
        self.read().contains_key(connection)
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let entries = self.read();
        RegistryStats {
            connection_count: entries.len(),
            user_count: PresenceSnapshot::from_connections(&entries).len(),
        }
    }
}
