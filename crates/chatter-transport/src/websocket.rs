//! WebSocket transport implementation.
//!
//! This module provides a WebSocket-based connector using tokio-tungstenite.
//! The credential travels as a cookie on the upgrade request, the same way a
//! browser session presents it.

use async_trait::async_trait;
use chatter_protocol::{ClientFrame, FrameCodec, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::COOKIE, HeaderValue},
        Error as WsError, Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::traits::{Connection, Connector, TransportError};

/// Default name of the credential cookie.
pub const DEFAULT_COOKIE_NAME: &str = "token";

/// Opens WebSocket connections to a hub endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    token: Option<String>,
    cookie_name: String,
    codec: FrameCodec,
}

impl WebSocketConnector {
    /// Create a connector for `url` (e.g. `ws://127.0.0.1:8080/ws`).
    #[must_use]
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            url: url.into(),
            token,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            codec: FrameCodec::default(),
        }
    }

    /// Present the credential under a different cookie name.
    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Get the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        if let Some(token) = &self.token {
            let cookie = HeaderValue::from_str(&format!("{}={}", self.cookie_name, token))
                .map_err(|e| TransportError::ConnectFailed(format!("Invalid credential: {}", e)))?;
            request.headers_mut().insert(COOKIE, cookie);
        }

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        debug!(url = %self.url, "WebSocket connected");

        Ok(Box::new(WebSocketConnection {
            stream,
            codec: self.codec,
        }))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A WebSocket connection to the hub.
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    codec: FrameCodec,
}

impl WebSocketConnection {
    fn decode(&self, text: &str) -> Option<ServerFrame> {
        match self.codec.decode(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, "Ignoring undecodable event");
                None
            }
        }
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn recv(&mut self) -> Result<Option<ServerFrame>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(frame) = self.decode(&text) {
                        return Ok(Some(frame));
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    // Some proxies rewrite text frames as binary
                    match std::str::from_utf8(&data) {
                        Ok(text) => {
                            if let Some(frame) = self.decode(text) {
                                return Ok(Some(frame));
                            }
                        }
                        Err(_) => warn!("Ignoring non UTF-8 binary frame"),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed)) | None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn send(&mut self, frame: ClientFrame) -> Result<(), TransportError> {
        let text = self.codec.encode(&frame)?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(format!("Failed to close: {}", e))),
        }
    }
}
