//! The client session controller.
//!
//! A session owns one logical connection to the hub and keeps it alive:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected (retry) -> ...
//! ```
//!
//! Whenever the connection closes, for any reason, the session waits for
//! the [`ReconnectPolicy`] delay and connects again. Events received while
//! connected are passed on as [`SessionEvent`]s. Send events issued while
//! the session is not connected are dropped.

use chatter_protocol::{ClientFrame, MessageFrame, PresenceEntry, ServerFrame};
use chatter_transport::{Connection, Connector};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// When to reconnect after the connection closes.
///
/// The default retries forever, one second apart.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub delay: Duration,
    /// Growth factor applied per consecutive failure. `1.0` keeps the delay
    /// fixed.
    pub multiplier: f64,
    /// Upper bound on the delay.
    pub max_delay: Option<Duration>,
    /// Give up after this many consecutive failed attempts.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

impl ReconnectPolicy {
    /// Retry forever with a constant delay.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            multiplier: 1.0,
            max_delay: None,
            max_attempts: None,
        }
    }

    /// Grow the delay by `multiplier` per failure, up to `max_delay`.
    #[must_use]
    pub fn with_backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        self.multiplier = multiplier.max(1.0);
        self.max_delay = Some(max_delay);
        self
    }

    /// Stop after `attempts` consecutive failures.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Delay before retry number `attempt` (1-based), or `None` to give up.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if matches!(self.max_attempts, Some(max) if attempt > max) {
            return None;
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);

        Some(match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        })
    }
}

/// Something the application should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The connection state changed.
    State(SessionState),
    /// The hub announced the full set of online users.
    Presence(Vec<PresenceEntry>),
    /// A message addressed to this user.
    Message(MessageFrame),
    /// The reconnect policy ran out of attempts; the session has stopped.
    GaveUp,
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session task has stopped.
    #[error("Session closed")]
    Closed,
}

#[derive(Debug)]
enum Command {
    Send(ClientFrame),
    Shutdown,
}

enum Outcome {
    Closed,
    Shutdown,
}

/// Handle to a running session.
pub struct Session {
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl Session {
    /// Start a session. It connects immediately.
    #[must_use]
    pub fn spawn(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        let driver = Driver {
            connector,
            policy,
            commands: commands_rx,
            events: events_tx,
            state: state_tx,
        };
        let task = tokio::spawn(driver.run());

        Self {
            commands: commands_tx,
            events: events_rx,
            state: state_rx,
            task,
        }
    }

    /// Queue a send event. It is dropped if the session is not connected
    /// when it is processed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub fn send(&self, frame: ClientFrame) -> Result<(), SessionError> {
        self.commands
            .send(Command::Send(frame))
            .map_err(|_| SessionError::Closed)
    }

    /// Wait for the next event. Returns `None` once the session has stopped
    /// and all events were read.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session reaches `state`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session stops first.
    pub async fn wait_for(&mut self, state: SessionState) -> Result<(), SessionError> {
        self.state
            .wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| SessionError::Closed)
    }

    /// Close the connection and stop reconnecting.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Session task failed: {}", e);
        }
    }
}

struct Driver {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<SessionState>,
}

impl Driver {
    fn set_state(&self, state: SessionState) {
        if *self.state.borrow() != state {
            self.state.send_replace(state);
            let _ = self.events.send(SessionEvent::State(state));
        }
    }

    async fn run(mut self) {
        let mut failures = 0u32;

        loop {
            self.set_state(SessionState::Connecting);

            match self.connector.connect().await {
                Ok(mut conn) => {
                    failures = 0;
                    info!(transport = self.connector.name(), "Connected");
                    self.set_state(SessionState::Connected);

                    let outcome = self.pump(conn.as_mut()).await;
                    if let Err(e) = conn.close().await {
                        debug!("Close failed: {}", e);
                    }
                    if let Outcome::Shutdown = outcome {
                        self.set_state(SessionState::Disconnected);
                        return;
                    }
                    warn!("Connection lost");
                }
                Err(e) => warn!(error = %e, "Connect failed"),
            }

            self.set_state(SessionState::Disconnected);
            failures = failures.saturating_add(1);

            let Some(delay) = self.policy.delay_for(failures) else {
                warn!(attempts = failures, "Giving up on reconnecting");
                let _ = self.events.send(SessionEvent::GaveUp);
                return;
            };

            debug!(?delay, attempt = failures, "Reconnecting after delay");
            if let Outcome::Shutdown = self.wait_disconnected(delay).await {
                return;
            }
        }
    }

    /// Forward events until the connection closes or a shutdown arrives.
    async fn pump(&mut self, conn: &mut dyn Connection) -> Outcome {
        loop {
            tokio::select! {
                event = conn.recv() => match event {
                    Ok(Some(ServerFrame::Presence { online })) => {
                        let _ = self.events.send(SessionEvent::Presence(online));
                    }
                    Ok(Some(ServerFrame::Message(message))) => {
                        let _ = self.events.send(SessionEvent::Message(message));
                    }
                    Ok(None) => return Outcome::Closed,
                    Err(e) => {
                        warn!(error = %e, "Receive failed");
                        return Outcome::Closed;
                    }
                },

                command = self.commands.recv() => match command {
                    Some(Command::Send(frame)) => {
                        if let Err(e) = conn.send(frame).await {
                            warn!(error = %e, "Send failed");
                            return Outcome::Closed;
                        }
                    }
                    Some(Command::Shutdown) | None => return Outcome::Shutdown,
                },
            }
        }
    }

    /// Sleep out the reconnect delay, dropping sends issued meanwhile.
    async fn wait_disconnected(&mut self, delay: Duration) -> Outcome {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return Outcome::Closed,
                command = self.commands.recv() => match command {
                    Some(Command::Send(frame)) => {
                        warn!(recipient = ?frame.recipient, "Not connected; send dropped");
                    }
                    Some(Command::Shutdown) | None => return Outcome::Shutdown,
                },
            }
        }
    }
}
