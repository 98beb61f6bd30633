//! SQLite-backed message store.

use super::{MessageStore, StoreError};
use crate::identity::Identity;
use crate::message::{now_millis, Message, NewMessage};
use async_trait::async_trait;
use chatter_protocol::{MessageId, UserId};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        sender      TEXT NOT NULL,
        recipient   TEXT NOT NULL,
        text        TEXT NOT NULL,
        created_at  INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_pair
        ON messages (sender, recipient, created_at);

    CREATE TABLE IF NOT EXISTS users (
        user_id     TEXT PRIMARY KEY,
        username    TEXT NOT NULL,
        first_seen  INTEGER NOT NULL,
        last_seen   INTEGER NOT NULL
    );
";

/// A store backed by a single SQLite connection.
///
/// Statements run on the blocking thread pool; the connection is shared
/// behind a mutex.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be
    /// applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path)?;
        // journal_mode reports the resulting mode as a row
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        let store = Self::with_connection(conn)?;

        info!("Message store opened at {}", path.display());
        Ok(store)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))?;
            f(&guard).map_err(StoreError::from)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, rusqlite::Error> {
    Ok(Message {
        id: MessageId(row.get::<_, i64>(0)? as u64),
        sender: UserId(row.get(1)?),
        recipient: UserId(row.get(2)?),
        text: row.get(3)?,
        created_at: row.get::<_, i64>(4)? as u64,
    })
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn save(&self, message: NewMessage) -> Result<Message, StoreError> {
        self.run(move |conn| {
            let created_at = now_millis();
            conn.execute(
                "INSERT INTO messages (sender, recipient, text, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    message.sender.as_str(),
                    message.recipient.as_str(),
                    message.text,
                    created_at as i64
                ],
            )?;

            Ok(Message {
                id: MessageId(conn.last_insert_rowid() as u64),
                sender: message.sender,
                recipient: message.recipient,
                text: message.text,
                created_at,
            })
        })
        .await
    }

    async fn query(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StoreError> {
        let (a, b) = (a.0.clone(), b.0.clone());
        self.run(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, sender, recipient, text, created_at FROM messages
                 WHERE (sender = ?1 AND recipient = ?2) OR (sender = ?2 AND recipient = ?1)
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![a, b], row_to_message)?;
            rows.collect()
        })
        .await
    }

    async fn remember_user(&self, identity: &Identity) -> Result<(), StoreError> {
        let identity = identity.clone();
        self.run(move |conn| {
            let now = now_millis() as i64;
            conn.execute(
                "INSERT INTO users (user_id, username, first_seen, last_seen) VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET username = excluded.username, last_seen = excluded.last_seen",
                params![identity.user_id.as_str(), identity.username, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn known_users(&self) -> Result<Vec<Identity>, StoreError> {
        self.run(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT user_id, username FROM users ORDER BY username ASC")?;
            let rows = stmt.query_map([], |row| {
                Ok(Identity::new(
                    UserId(row.get(0)?),
                    row.get::<_, String>(1)?,
                ))
            })?;
            rows.collect()
        })
        .await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_message(sender: &str, recipient: &str, text: &str) -> NewMessage {
        NewMessage {
            sender: sender.into(),
            recipient: recipient.into(),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn test_save_and_query() {
        let store = SqliteStore::open_in_memory().unwrap();
        let m1 = store.save(new_message("a", "b", "hi")).await.unwrap();
        let m2 = store.save(new_message("b", "a", "hello")).await.unwrap();
        store.save(new_message("b", "c", "unrelated")).await.unwrap();

        assert!(m2.id > m1.id);

        let history = store.query(&"a".into(), &"b".into()).await.unwrap();
        assert_eq!(history, vec![m1, m2]);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chatter.db");

        let saved = {
            let store = SqliteStore::open(&path).unwrap();
            store.remember_user(&Identity::new("u1", "alice")).await.unwrap();
            store.save(new_message("u1", "u2", "still here")).await.unwrap()
        };

        let store = SqliteStore::open(&path).unwrap();
        let history = store.query(&"u2".into(), &"u1".into()).await.unwrap();
        assert_eq!(history, vec![saved]);
        assert_eq!(
            store.known_users().await.unwrap(),
            vec![Identity::new("u1", "alice")]
        );
    }

    #[tokio::test]
    async fn test_remember_user_updates_username() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.remember_user(&Identity::new("u1", "alice")).await.unwrap();
        store.remember_user(&Identity::new("u1", "alicia")).await.unwrap();

        let users = store.known_users().await.unwrap();
        assert_eq!(users, vec![Identity::new("u1", "alicia")]);
    }

    #[test]
    fn test_open_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        match SqliteStore::open(blocker.join("chatter.db")) {
            Err(StoreError::Unavailable(_)) => {}
            Err(other) => panic!("Expected Unavailable, got {:?}", other),
            Ok(_) => panic!("Expected open to fail"),
        }
    }
}
