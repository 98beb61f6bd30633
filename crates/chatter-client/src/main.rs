//! # Chatter Client
//!
//! Line-oriented terminal client.
//!
//! ```bash
//! chatter-client --url ws://127.0.0.1:8080/ws --token <jwt>
//! ```
//!
//! Commands: `/select <userId>`, `/who`, `/show`, `/quit`. Any other line is
//! sent to the selected user.

use anyhow::{bail, Context, Result};
use chatter_client::{ChatView, Entry, HistoryClient, ReconnectPolicy, Session, ViewUpdate};
use chatter_protocol::UserId;
use chatter_transport::WebSocketConnector;
use clap::Parser;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "chatter-client", version, about = "Terminal client for chatter")]
struct Args {
    /// WebSocket endpoint of the hub.
    #[arg(long, env = "CHATTER_URL", default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Credential issued by the login flow.
    #[arg(long, env = "CHATTER_TOKEN")]
    token: String,

    /// Root of the hub's HTTP API. Derived from `--url` when omitted.
    #[arg(long, env = "CHATTER_API_URL")]
    api_url: Option<reqwest::Url>,

    /// Cookie the hub reads the credential from.
    #[arg(long, default_value = "token")]
    cookie_name: String,

    /// Delay between reconnect attempts, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    reconnect_delay_ms: u64,

    /// Give up after this many consecutive failed reconnects.
    #[arg(long)]
    max_attempts: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(rename = "userId")]
    user_id: String,
    username: String,
}

/// Read the identity out of a credential without verifying it. The hub does
/// the verifying; the client only needs to know who it is.
fn identity_from_token(token: &str) -> Result<(UserId, String)> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.required_spec_claims.clear();
    validation.validate_exp = false;

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .context("Token does not carry a readable identity")?;
    Ok((UserId::new(data.claims.user_id), data.claims.username))
}

fn print_entry(view: &ChatView, entry: &Entry) {
    let marker = if entry.is_pending() { "*" } else { " " };
    let who = if &entry.sender == view.conversation.me() {
        "you".to_string()
    } else {
        view.people
            .username(&entry.sender)
            .map_or_else(|| entry.sender.to_string(), str::to_string)
    };
    println!("{marker} {who}: {}", entry.text);
}

fn render(view: &ChatView, update: ViewUpdate) {
    match update {
        ViewUpdate::State(state) => println!("-- {:?}", state),
        ViewUpdate::Presence => {
            let online: Vec<String> = view
                .people
                .iter()
                .map(|(id, name)| format!("{name} ({id})"))
                .collect();
            println!("-- online: {}", online.join(", "));
        }
        ViewUpdate::Appended(entry) => print_entry(view, &entry),
        ViewUpdate::Ignored(frame) => {
            println!("-- new message from {} (/select {} to read)", frame.sender, frame.sender);
        }
        ViewUpdate::GaveUp => println!("-- giving up on reconnecting"),
    }
}

/// Handle one input line. Returns `false` to quit.
async fn handle_line(
    view: &mut ChatView,
    session: &Session,
    history: &HistoryClient,
    line: &str,
) -> Result<bool> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(true);
    }

    if let Some(command) = line.strip_prefix('/') {
        let mut parts = command.splitn(2, ' ');
        match (parts.next(), parts.next().map(str::trim)) {
            (Some("select"), Some(user)) if !user.is_empty() => {
                let partner = UserId::new(user);
                let messages = match history.fetch(&partner).await {
                    Ok(messages) => messages,
                    Err(e) => {
                        // Live messages still arrive; only the backlog is missing
                        warn!(error = %e, "Failed to load history");
                        Vec::new()
                    }
                };
                view.conversation.select(partner, messages);
                println!("-- talking to {user}");
                for entry in view.conversation.displayed() {
                    print_entry(view, entry);
                }
            }
            (Some("who"), _) => render(view, ViewUpdate::Presence),
            (Some("show"), _) => {
                for entry in view.conversation.displayed() {
                    print_entry(view, entry);
                }
            }
            (Some("quit"), _) => return Ok(false),
            _ => println!("-- commands: /select <userId>, /who, /show, /quit"),
        }
        return Ok(true);
    }

    match view.conversation.send(line) {
        Some(frame) => session.send(frame)?,
        None => println!("-- /select someone first"),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let (me, username) = identity_from_token(&args.token)?;
    if me.as_str().is_empty() {
        bail!("Token has an empty userId");
    }
    println!("-- signed in as {username} ({me})");

    let history = match args.api_url {
        Some(base) => HistoryClient::new(base, args.token.clone(), args.cookie_name.clone()),
        None => HistoryClient::from_websocket_url(
            &args.url,
            args.token.clone(),
            args.cookie_name.clone(),
        )?,
    };

    let connector =
        WebSocketConnector::new(args.url, Some(args.token)).with_cookie_name(args.cookie_name);
    let mut policy = ReconnectPolicy::fixed(Duration::from_millis(args.reconnect_delay_ms));
    if let Some(max) = args.max_attempts {
        policy = policy.with_max_attempts(max);
    }

    let mut session = Session::spawn(Arc::new(connector), policy);
    let mut view = ChatView::new(me);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => {
                    if !handle_line(&mut view, &session, &history, &line).await? {
                        break;
                    }
                }
                None => break,
            },
            event = session.next_event() => match event {
                Some(event) => {
                    let update = view.apply(event);
                    render(&view, update);
                }
                None => break,
            },
        }
    }

    session.shutdown().await;
    Ok(())
}
