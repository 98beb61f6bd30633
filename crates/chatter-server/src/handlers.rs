//! Connection handlers for the chatter server.
//!
//! Each WebSocket gets one worker. The worker authenticates the transport
//! once at upgrade time, registers it, then reads send events and relays
//! them one at a time, so a single transport's messages are relayed in the
//! order they arrived. A spawned writer drains the transport's outbound
//! queue into the socket. Whatever ends the connection (close frame, socket
//! error, eviction), the worker is the one that unregisters it.

use crate::api;
use crate::auth::{extract_credential, JwtVerifier};
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        RawQuery, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chatter_core::{
    AuthError, ConnectionId, ConnectionRegistry, Identity, IdentityVerifier, MessageRelay,
    MessageStore, RelayError, TransportHandle,
};
use chatter_protocol::{ClientFrame, FrameCodec, ServerFrame};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Live, authenticated transports.
    pub registry: Arc<ConnectionRegistry>,
    /// Persists and forwards send events.
    pub relay: MessageRelay,
    /// The message store behind the relay and the HTTP endpoints.
    pub store: Arc<dyn MessageStore>,
    /// Resolves handshake credentials.
    pub verifier: Arc<dyn IdentityVerifier>,
    /// Inbound codec, limited to the configured message size.
    pub codec: FrameCodec,
    /// Outbound codec. Presence lists and forwarded messages are not held to
    /// the inbound limit.
    pub outbound_codec: FrameCodec,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create app state verifying credentials with the configured JWT secret.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn MessageStore>) -> Self {
        let verifier = Arc::new(JwtVerifier::new(&config.auth.jwt_secret));
        Self::with_verifier(config, store, verifier)
    }

    /// Create app state with a custom identity verifier.
    #[must_use]
    pub fn with_verifier(
        config: Config,
        store: Arc<dyn MessageStore>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            relay: MessageRelay::new(Arc::clone(&registry), Arc::clone(&store)),
            registry,
            store,
            verifier,
            codec: FrameCodec::new(config.transport.max_message_size),
            outbound_codec: FrameCodec::default(),
            config,
        }
    }

    /// Resolve the identity presented on a request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredential`] if neither the cookie nor the
    /// query carries a credential, or the verifier's error otherwise.
    pub fn authenticate(
        &self,
        headers: &HeaderMap,
        query: Option<&str>,
    ) -> Result<Identity, AuthError> {
        let credential = extract_credential(headers, &self.config.auth.cookie_name, query)
            .ok_or(AuthError::MissingCredential)?;
        self.verifier.verify(&credential)
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();

    Router::new()
        .route(&ws_path, get(ws_handler))
        .route("/health", get(health_handler))
        .nest("/api/v1", api::routes())
        .with_state(state)
}

/// Serve the hub on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server stops with an I/O error.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if no JWT secret is configured or the server fails to
/// start.
pub async fn run_server(mut config: Config, store: Arc<dyn MessageStore>) -> Result<()> {
    config.validate()?;

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {:#}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Chatter server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    let state = Arc::new(AppState::new(config, store));
    serve(listener, state).await
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.registry.stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.store.name(),
        "connections": stats.connection_count,
        "users": stats.user_count,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let identity = match state.authenticate(&headers, query.as_deref()) {
        Ok(identity) => Some(identity),
        Err(e) => {
            metrics::record_auth_failure();
            if state.config.auth.reject_anonymous {
                debug!(error = %e, "Refusing unauthenticated upgrade");
                return api::ApiError::from(e).into_response();
            }
            debug!(error = %e, "Upgrading without an identity");
            None
        }
    };

    ws.max_message_size(state.codec.max_frame_size())
        .on_upgrade(move |socket| handle_websocket(socket, state, identity))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, identity: Option<Identity>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection = ConnectionId::generate();
    let (handle, outbound) = TransportHandle::channel(
        connection.clone(),
        state.config.transport.outbound_queue_capacity,
    );

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_outbound(
        sink,
        outbound,
        handle.clone(),
        state.outbound_codec,
    ));

    // Anonymous transports are never registered: no presence, never a recipient
    match &identity {
        Some(identity) => {
            debug!(connection = %connection, user = %identity.user_id, "WebSocket connected");
            if let Err(e) = state.store.remember_user(identity).await {
                error!(connection = %connection, error = %e, "Failed to remember user");
            }
            state.registry.register(identity.clone(), handle.clone());
            metrics::record_registry_change(state.registry.stats().connection_count);
        }
        None => debug!(connection = %connection, "Anonymous WebSocket connected"),
    }

    loop {
        tokio::select! {
            biased;

            () = handle.evicted() => {
                warn!(connection = %connection, "Transport evicted; closing");
                metrics::record_eviction();
                break;
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_frame(text.len(), "inbound");
                        handle_text(&state, &connection, &text).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        metrics::record_frame(data.len(), "inbound");
                        match std::str::from_utf8(&data) {
                            Ok(text) => handle_text(&state, &connection, text).await,
                            Err(_) => {
                                warn!(connection = %connection, "Discarding non UTF-8 frame");
                                metrics::record_relay_failure("validation");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Pongs are answered by the WebSocket layer
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    if state.registry.unregister(&connection).is_some() {
        metrics::record_registry_change(state.registry.stats().connection_count);
    }
    writer.abort();

    debug!(connection = %connection, "WebSocket disconnected");
}

/// Decode and relay one inbound event. Failures are logged and discarded;
/// the connection stays open.
async fn handle_text(state: &AppState, connection: &ConnectionId, text: &str) {
    let frame: ClientFrame = match state.codec.decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(connection = %connection, error = %e, "Discarding malformed event");
            metrics::record_relay_failure("validation");
            return;
        }
    };

    let start = Instant::now();
    match state.relay.relay(connection, frame).await {
        Ok(delivery) => {
            debug!(
                connection = %connection,
                message = %delivery.message.id,
                recipient = %delivery.message.recipient,
                forwarded = delivery.forwarded,
                "Relayed"
            );
            metrics::record_relayed(start.elapsed().as_secs_f64());
        }
        Err(e @ RelayError::Storage(_)) => {
            error!(connection = %connection, error = %e, "Message dropped");
            metrics::record_relay_failure(e.kind());
        }
        Err(e) => {
            warn!(connection = %connection, error = %e, "Discarding event");
            metrics::record_relay_failure(e.kind());
        }
    }
}

/// Drain a transport's outbound queue into its socket.
///
/// A frame that cannot be encoded or written evicts the transport, which
/// wakes the worker. Frames are never skipped.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Arc<ServerFrame>>,
    handle: TransportHandle,
    codec: FrameCodec,
) {
    while let Some(frame) = outbound.recv().await {
        let text = match codec.encode(frame.as_ref()) {
            Ok(text) => text,
            Err(e) => {
                error!(connection = %handle.id(), error = %e, kind = frame.kind(), "Encode failed");
                metrics::record_error("encode");
                handle.evict();
                break;
            }
        };

        metrics::record_frame(text.len(), "outbound");
        if let Err(e) = sink.send(Message::Text(text)).await {
            debug!(connection = %handle.id(), error = %e, "Write failed");
            handle.evict();
            break;
        }
    }
}
