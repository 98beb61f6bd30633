//! The selected conversation.
//!
//! Holds the message list for one conversation partner at a time. Sends are
//! appended optimistically under a locally generated [`EntryId::Pending`]
//! key; the hub never echoes them back, so they are never reconciled with
//! the store-assigned id. Displaying the list drops repeated ids, which
//! absorbs duplicate deliveries.

use chatter_protocol::{ClientFrame, MessageFrame, MessageId, UserId};
use std::collections::HashSet;
use uuid::Uuid;

/// Identifier of a displayed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryId {
    /// Appended locally on send; not yet known to the store.
    Pending(Uuid),
    /// Assigned by the store.
    Confirmed(MessageId),
}

/// One message in the conversation view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub sender: UserId,
    pub recipient: UserId,
    pub text: String,
    /// Milliseconds since the Unix epoch, if the hub supplied it.
    pub created_at: Option<u64>,
}

impl Entry {
    /// Check if this entry was sent from this client and is unconfirmed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.id, EntryId::Pending(_))
    }
}

impl From<MessageFrame> for Entry {
    fn from(frame: MessageFrame) -> Self {
        Self {
            id: EntryId::Confirmed(frame.id),
            sender: frame.sender,
            recipient: frame.recipient,
            text: frame.text,
            created_at: (frame.created_at > 0).then_some(frame.created_at),
        }
    }
}

/// Message list for the currently selected partner.
#[derive(Debug, Clone)]
pub struct Conversation {
    me: UserId,
    partner: Option<UserId>,
    entries: Vec<Entry>,
}

impl Conversation {
    /// Create an empty conversation view for the local user.
    #[must_use]
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            partner: None,
            entries: Vec::new(),
        }
    }

    /// Get the local user.
    #[must_use]
    pub fn me(&self) -> &UserId {
        &self.me
    }

    /// Get the selected partner.
    #[must_use]
    pub fn partner(&self) -> Option<&UserId> {
        self.partner.as_ref()
    }

    /// Switch to `partner`, replacing the list with `history`.
    pub fn select(&mut self, partner: UserId, history: Vec<MessageFrame>) {
        self.partner = Some(partner);
        self.entries = history.into_iter().map(Entry::from).collect();
    }

    /// Deselect the partner and clear the list.
    pub fn clear(&mut self) {
        self.partner = None;
        self.entries.clear();
    }

    /// Apply an incoming message event.
    ///
    /// The message is appended only if it comes from the selected partner.
    /// Returns whether it was appended.
    pub fn receive(&mut self, frame: MessageFrame) -> bool {
        if self.partner.as_ref() != Some(&frame.sender) {
            return false;
        }
        self.entries.push(frame.into());
        true
    }

    /// Append a message to the selected partner and build its send event.
    ///
    /// Returns `None` if no partner is selected or `text` is empty.
    pub fn send(&mut self, text: impl Into<String>) -> Option<ClientFrame> {
        let partner = self.partner.clone()?;
        let text = text.into();
        if text.is_empty() {
            return None;
        }

        self.entries.push(Entry {
            id: EntryId::Pending(Uuid::new_v4()),
            sender: self.me.clone(),
            recipient: partner.clone(),
            text: text.clone(),
            created_at: None,
        });

        Some(ClientFrame::send(partner, text))
    }

    /// Raw list, including duplicates, in arrival order.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// The list as it should be shown: arrival order, first occurrence of
    /// each id kept.
    #[must_use]
    pub fn displayed(&self) -> Vec<&Entry> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        self.entries
            .iter()
            .filter(|entry| seen.insert(entry.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u64, sender: &str, recipient: &str, text: &str) -> MessageFrame {
        MessageFrame {
            id: MessageId(id),
            sender: UserId::new(sender),
            recipient: UserId::new(recipient),
            text: text.into(),
            created_at: 1_700_000_000_000 + id,
        }
    }

    fn with_bob() -> Conversation {
        let mut conversation = Conversation::new(UserId::new("alice"));
        conversation.select(UserId::new("bob"), vec![frame(1, "alice", "bob", "hey")]);
        conversation
    }

    #[test]
    fn test_select_loads_history() {
        let conversation = with_bob();
        assert_eq!(conversation.partner(), Some(&UserId::new("bob")));
        assert_eq!(conversation.entries().len(), 1);
        assert_eq!(
            conversation.entries()[0].id,
            EntryId::Confirmed(MessageId(1))
        );
    }

    #[test]
    fn test_receive_only_from_partner() {
        let mut conversation = with_bob();
        assert!(conversation.receive(frame(2, "bob", "alice", "hi")));
        assert!(!conversation.receive(frame(3, "carol", "alice", "psst")));
        let texts: Vec<_> = conversation.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["hey", "hi"]);
    }

    #[test]
    fn test_receive_without_selection_is_dropped() {
        let mut conversation = Conversation::new(UserId::new("alice"));
        assert!(!conversation.receive(frame(1, "bob", "alice", "hi")));
        assert!(conversation.entries().is_empty());
    }

    #[test]
    fn test_send_appends_pending() {
        let mut conversation = with_bob();
        let event = conversation.send("optimistic").unwrap();
        assert_eq!(event, ClientFrame::send(UserId::new("bob"), "optimistic"));

        let last = conversation.entries().last().unwrap();
        assert!(last.is_pending());
        assert_eq!(last.sender, UserId::new("alice"));
        assert_eq!(last.created_at, None);
    }

    #[test]
    fn test_send_requires_partner_and_text() {
        let mut conversation = Conversation::new(UserId::new("alice"));
        assert!(conversation.send("nobody").is_none());

        let mut conversation = with_bob();
        assert!(conversation.send("").is_none());
        assert_eq!(conversation.entries().len(), 1);
    }

    #[test]
    fn test_displayed_dedups_by_id() {
        let mut conversation = with_bob();
        conversation.receive(frame(2, "bob", "alice", "hi"));
        conversation.receive(frame(2, "bob", "alice", "hi"));
        conversation.send("same text");
        conversation.send("same text");

        assert_eq!(conversation.entries().len(), 5);
        // Two distinct pending ids are never merged
        let displayed = conversation.displayed();
        assert_eq!(displayed.len(), 4);
        assert_eq!(displayed[1].id, EntryId::Confirmed(MessageId(2)));
    }

    #[test]
    fn test_select_replaces_list() {
        let mut conversation = with_bob();
        conversation.send("to bob");
        conversation.select(UserId::new("carol"), Vec::new());
        assert!(conversation.entries().is_empty());
        assert!(!conversation.receive(frame(9, "bob", "alice", "late")));

        conversation.clear();
        assert_eq!(conversation.partner(), None);
    }
}
