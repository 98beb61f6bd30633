//! Presence snapshots and the broadcaster.
//!
//! Presence is never stored. It is recomputed from the registry on every
//! change and sent in full, so a client can never regress to an older set
//! than one it already received.

use crate::registry::{ConnectedUser, ConnectionId};
use chatter_protocol::{PresenceEntry, ServerFrame, UserId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{trace, warn};

/// The set of users online at one point in time, deduplicated by user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    users: BTreeMap<UserId, String>,
}

impl PresenceSnapshot {
    /// Build a snapshot from registry entries.
    #[must_use]
    pub fn from_connections(connections: &HashMap<ConnectionId, ConnectedUser>) -> Self {
        let users = connections
            .values()
            .map(|entry| {
                (
                    entry.identity.user_id.clone(),
                    entry.identity.username.clone(),
                )
            })
            .collect();
        Self { users }
    }

    /// Number of distinct users online.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if nobody is online.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Check if a user is online.
    #[must_use]
    pub fn contains(&self, user: &UserId) -> bool {
        self.users.contains_key(user)
    }

    /// Iterate over online user IDs.
    pub fn user_ids(&self) -> impl Iterator<Item = &UserId> {
        self.users.keys()
    }

    /// Get the wire entries.
    #[must_use]
    pub fn entries(&self) -> Vec<PresenceEntry> {
        self.users
            .iter()
            .map(|(user_id, username)| PresenceEntry {
                user_id: user_id.clone(),
                username: username.clone(),
            })
            .collect()
    }

    /// Build the presence event for this snapshot.
    #[must_use]
    pub fn to_frame(&self) -> ServerFrame {
        ServerFrame::presence(self.entries())
    }
}

/// Outcome of one presence broadcast.
#[derive(Debug, Clone, Default)]
pub struct Announcement {
    /// Transports the event was queued on.
    pub delivered: usize,
    /// Transports whose send failed; they have been evicted.
    pub failed: Vec<ConnectionId>,
}

/// Send the current presence set to every registered transport.
///
/// Sends never wait. A transport whose queue is full or closed is evicted
/// and left for its own worker to unregister, so a slow client cannot hold
/// up the rest.
pub fn announce(connections: &HashMap<ConnectionId, ConnectedUser>) -> Announcement {
    let snapshot = PresenceSnapshot::from_connections(connections);
    let frame = Arc::new(snapshot.to_frame());
    let mut announcement = Announcement::default();

    for (connection, entry) in connections {
        match entry.handle.send(Arc::clone(&frame)) {
            Ok(()) => announcement.delivered += 1,
            Err(e) => {
                warn!(connection = %connection, error = %e, "Presence send failed");
                announcement.failed.push(connection.clone());
            }
        }
    }

    trace!(
        online = snapshot.len(),
        delivered = announcement.delivered,
        failed = announcement.failed.len(),
        "Presence announced"
    );

    announcement
}
