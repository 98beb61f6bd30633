//! Conversation history from the hub's HTTP API.
//!
//! Live events only carry what arrives while connected; everything before
//! that is read from `GET /api/v1/messages/:user_id`, presenting the same
//! credential cookie as the WebSocket handshake.

use chatter_protocol::{MessageFrame, UserId};
use reqwest::{header::COOKIE, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;

const API_PREFIX: &str = "/api/v1";

/// History errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Invalid hub URL: {0}")]
    InvalidUrl(String),

    #[error("History request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Hub answered history request with {0}")]
    Status(StatusCode),
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Fetches conversation history for the local user.
#[derive(Debug, Clone)]
pub struct HistoryClient {
    base: Url,
    token: String,
    cookie_name: String,
    client: reqwest::Client,
}

impl HistoryClient {
    /// Create a client for the API rooted at `base` (e.g. `http://host/api/v1`).
    #[must_use]
    pub fn new(base: Url, token: impl Into<String>, cookie_name: impl Into<String>) -> Self {
        Self {
            base,
            token: token.into(),
            cookie_name: cookie_name.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Derive the API root from the hub's WebSocket endpoint: same host and
    /// port, `ws` becomes `http` and `wss` becomes `https`.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::InvalidUrl`] if the URL cannot be parsed or
    /// uses a scheme other than ws, wss, http or https.
    pub fn from_websocket_url(
        url: &str,
        token: impl Into<String>,
        cookie_name: impl Into<String>,
    ) -> Result<Self, HistoryError> {
        let mut base = Url::parse(url).map_err(|e| HistoryError::InvalidUrl(e.to_string()))?;
        let scheme = match base.scheme() {
            "ws" | "http" => "http",
            "wss" | "https" => "https",
            other => return Err(HistoryError::InvalidUrl(format!("unsupported scheme {other}"))),
        };
        base.set_scheme(scheme)
            .map_err(|()| HistoryError::InvalidUrl(url.to_string()))?;
        base.set_path(API_PREFIX);
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self::new(base, token, cookie_name))
    }

    /// The API root requests are made against.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn messages_url(&self, partner: &UserId) -> Result<Url, HistoryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| HistoryError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .push("messages")
            .push(partner.as_str());
        Ok(url)
    }

    /// Every message between the local user and `partner`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub cannot be reached, refuses the credential,
    /// or answers with something other than a message list.
    pub async fn fetch(&self, partner: &UserId) -> Result<Vec<MessageFrame>, HistoryError> {
        let response = self
            .client
            .get(self.messages_url(partner)?)
            .header(COOKIE, format!("{}={}", self.cookie_name, self.token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HistoryError::Status(response.status()));
        }

        let envelope: Envelope<Vec<MessageFrame>> = response.json().await?;
        Ok(envelope.data)
    }
}
