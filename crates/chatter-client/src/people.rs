//! Online people, as last announced by the hub.

use chatter_protocol::{PresenceEntry, UserId};
use std::collections::BTreeMap;

/// The latest presence set, minus the local user.
#[derive(Debug, Clone)]
pub struct OnlinePeople {
    me: UserId,
    online: BTreeMap<UserId, String>,
}

impl OnlinePeople {
    /// Create an empty view for the local user.
    #[must_use]
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            online: BTreeMap::new(),
        }
    }

    /// Replace the view with a presence event. Every event is a full
    /// snapshot, so nothing from the previous one is kept.
    pub fn update(&mut self, entries: Vec<PresenceEntry>) {
        self.online = entries
            .into_iter()
            .filter(|entry| entry.user_id != self.me)
            .map(|entry| (entry.user_id, entry.username))
            .collect();
    }

    /// Forget everyone, e.g. after losing the connection.
    pub fn clear(&mut self) {
        self.online.clear();
    }

    /// Check if `user` is online.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.online.contains_key(user)
    }

    /// Username of an online user.
    #[must_use]
    pub fn username(&self, user: &UserId) -> Option<&str> {
        self.online.get(user).map(String::as_str)
    }

    /// Online users other than the local one, ordered by user id.
    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &str)> {
        self.online.iter().map(|(id, name)| (id, name.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.online.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}
