//! Applies session events to the local chat state.

use crate::conversation::{Conversation, Entry};
use crate::people::OnlinePeople;
use crate::session::{SessionEvent, SessionState};
use chatter_protocol::{MessageFrame, UserId};

/// What an event changed.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    State(SessionState),
    /// The online list was replaced.
    Presence,
    /// A message was appended to the selected conversation.
    Appended(Entry),
    /// A message arrived for a conversation that is not selected.
    Ignored(MessageFrame),
    GaveUp,
}

/// Local state of one chat client.
#[derive(Debug, Clone)]
pub struct ChatView {
    pub conversation: Conversation,
    pub people: OnlinePeople,
    state: SessionState,
}

impl ChatView {
    /// Create an empty view for the local user.
    #[must_use]
    pub fn new(me: UserId) -> Self {
        Self {
            conversation: Conversation::new(me.clone()),
            people: OnlinePeople::new(me),
            state: SessionState::Disconnected,
        }
    }

    /// Last known connection state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Apply one session event.
    pub fn apply(&mut self, event: SessionEvent) -> ViewUpdate {
        match event {
            SessionEvent::State(state) => {
                self.state = state;
                // A stale online list is worse than none; the next presence
                // event after reconnecting refills it
                if state == SessionState::Disconnected {
                    self.people.clear();
                }
                ViewUpdate::State(state)
            }
            SessionEvent::Presence(online) => {
                self.people.update(online);
                ViewUpdate::Presence
            }
            SessionEvent::Message(frame) => {
                if self.conversation.receive(frame.clone()) {
                    ViewUpdate::Appended(frame.into())
                } else {
                    ViewUpdate::Ignored(frame)
                }
            }
            SessionEvent::GaveUp => ViewUpdate::GaveUp,
        }
    }
}
