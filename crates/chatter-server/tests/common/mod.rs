//! Shared helpers for driving a real hub over loopback.

#![allow(dead_code)]

use chatter_core::{Identity, MemoryStore, MessageStore};
use chatter_protocol::{MessageFrame, PresenceEntry, ServerFrame};
use chatter_server::{issue_token, serve, AppState, Config};
use chatter_transport::{Connection, Connector, TransportError, WebSocketConnector};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;

pub const SECRET: &str = "integration-secret";
pub const WAIT: Duration = Duration::from_secs(5);

pub struct Hub {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
}

pub async fn spawn_hub() -> Hub {
    spawn_hub_with(|_| {}).await
}

pub async fn spawn_hub_with(configure: impl FnOnce(&mut Config)) -> Hub {
    let mut config = Config::default();
    config.auth.jwt_secret = SECRET.into();
    config.metrics.enabled = false;
    configure(&mut config);

    let store: Arc<dyn MessageStore> = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(config, store));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, Arc::clone(&state)));

    Hub { addr, state }
}

impl Hub {
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn token(&self, identity: &Identity) -> String {
        issue_token(SECRET, identity, None).unwrap()
    }

    pub async fn try_connect(
        &self,
        token: Option<String>,
    ) -> Result<Box<dyn Connection>, TransportError> {
        WebSocketConnector::new(self.ws_url(), token).connect().await
    }

    pub async fn connect(&self, identity: &Identity) -> Box<dyn Connection> {
        self.try_connect(Some(self.token(identity))).await.unwrap()
    }

    /// HTTP GET against the hub. Returns the status code and the JSON body.
    pub async fn get(&self, path: &str, token: Option<&str>) -> (u16, serde_json::Value) {
        let mut request = reqwest::Client::new().get(format!("http://{}{}", self.addr, path));
        if let Some(token) = token {
            request = request.header(reqwest::header::COOKIE, format!("token={token}"));
        }

        let response = timeout(WAIT, request.send()).await.unwrap().unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}

pub fn entry(identity: &Identity) -> PresenceEntry {
    identity.clone().into()
}

pub async fn next_event(conn: &mut Box<dyn Connection>) -> ServerFrame {
    timeout(WAIT, conn.recv())
        .await
        .expect("timed out waiting for an event")
        .unwrap()
        .expect("connection closed")
}

/// Read presence events until one satisfies `done`.
pub async fn presence_until(
    conn: &mut Box<dyn Connection>,
    done: impl Fn(&[PresenceEntry]) -> bool,
) -> Vec<PresenceEntry> {
    loop {
        if let ServerFrame::Presence { online } = next_event(conn).await {
            if done(&online) {
                return online;
            }
        }
    }
}

/// Read events until a message arrives.
pub async fn next_message(conn: &mut Box<dyn Connection>) -> MessageFrame {
    loop {
        if let ServerFrame::Message(message) = next_event(conn).await {
            return message;
        }
    }
}

/// Assert that no message arrives within `window`. Presence is skipped.
pub async fn assert_no_message(conn: &mut Box<dyn Connection>, window: Duration) {
    let waited = timeout(window, async {
        loop {
            match conn.recv().await {
                Ok(Some(ServerFrame::Message(message))) => return Some(message),
                Ok(Some(ServerFrame::Presence { .. })) => continue,
                _ => return None,
            }
        }
    })
    .await;

    if let Ok(Some(message)) = waited {
        panic!("unexpected message: {:?}", message);
    }
}
