//! # chatter-client
//!
//! Client side of chatter: a [`Session`] that keeps one connection to the
//! hub alive across disconnects, and the local state a chat UI renders from.
//!
//! ```rust,ignore
//! use chatter_client::{ChatView, HistoryClient, ReconnectPolicy, Session};
//! use chatter_transport::WebSocketConnector;
//!
//! let connector = WebSocketConnector::new("ws://127.0.0.1:8080/ws", Some(token));
//! let mut session = Session::spawn(Arc::new(connector), ReconnectPolicy::default());
//! let mut view = ChatView::new(me);
//!
//! let history = HistoryClient::from_websocket_url(url, token, "token")?;
//! view.conversation.select(bob.clone(), history.fetch(&bob).await?);
//! if let Some(frame) = view.conversation.send("hi") {
//!     session.send(frame)?;
//! }
//! while let Some(event) = session.next_event().await {
//!     view.apply(event);
//! }
//! ```

pub mod conversation;
pub mod history;
pub mod people;
pub mod session;
pub mod view;

pub use conversation::{Conversation, Entry, EntryId};
pub use history::{HistoryClient, HistoryError};
pub use people::OnlinePeople;
pub use session::{ReconnectPolicy, Session, SessionError, SessionEvent, SessionState};
pub use view::{ChatView, ViewUpdate};
