//! # feed — Vendor real-time trade feed
//!
//! An explicitly constructed, owned WebSocket client.  Nothing global: the
//! caller builds a [`RealtimeService`] from a [`RealtimeConfig`], calls
//! [`RealtimeService::connect`], and drives it through the returned
//! [`FeedHandle`].
//!
//! ```text
//!  connect ──▶ Connected ──(frame)──▶ FeedEvent::Tick
//!     ▲            │
//!     │      unexpected close / error
//!     │            ▼
//!     └── sleep base·2^(n-1) ◀── attempt n ≤ max ──▶ Offline (terminal)
//! ```
//!
//! Subscriptions survive reconnects: the set of symbols is replayed every
//! time the socket opens.  A clean `1000` close from either side ends the
//! feed without retrying.

use std::{collections::BTreeSet, time::Duration};

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::models::{tick::parse_trade_frame, LiveTick};

const EVENT_BUFFER: usize = 1024;

// ─── Config ───────────────────────────────────────────────────────────────────

/// Connection settings, injected by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeConfig {
    /// Vendor socket, e.g. `wss://ws.eodhistoricaldata.com/ws/us`.
    pub url: String,
    pub api_token: String,
    /// Reconnects attempted after an unexpected drop before going `Offline`.
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect; doubles on each further attempt.
    pub reconnect_base_delay: Duration,
}

impl RealtimeConfig {
    /// Vendor tokens look like `xxxxxxxx.xxxxxxxx` (8 alphanumerics, dot, 8 alphanumerics).
    pub fn token_looks_valid(&self) -> bool {
        match self.api_token.split_once('.') {
            Some((a, b)) => [a, b]
                .iter()
                .all(|part| part.len() == 8 && part.chars().all(|c| c.is_ascii_alphanumeric())),
            None => false,
        }
    }

    fn url_with_token(&self, token: &str) -> Result<Url, String> {
        let mut url = Url::parse(&self.url).map_err(|e| format!("invalid realtime URL '{}': {e}", self.url))?;
        url.query_pairs_mut().append_pair("api_token", token);
        Ok(url)
    }

    fn auth_url(&self) -> Result<Url, String> {
        self.url_with_token(&self.api_token)
    }

    /// URL safe to put in logs.
    pub fn redacted_url(&self) -> String {
        self.url_with_token("TOKEN_HIDDEN")
            .map(String::from)
            .unwrap_or_else(|_| self.url.clone())
    }
}

/// Delay before reconnect attempt `attempt` (1-based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exp)
}

// ─── Events & Commands ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedStatus {
    /// No vendor token configured.
    Disabled,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    /// Reconnect attempts exhausted.  Terminal.
    Offline,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Tick(LiveTick),
    Status(FeedStatus),
    /// Non-fatal problem worth surfacing (bad frame, failed connect attempt).
    Error(String),
}

#[derive(Debug)]
enum FeedCommand {
    Subscribe(String),
    Unsubscribe(String),
    Disconnect,
}

/// Cloneable control side of a running feed.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    tx: mpsc::UnboundedSender<FeedCommand>,
}

impl FeedHandle {
    pub fn subscribe(&self, symbol: &str) {
        self.send(FeedCommand::Subscribe(symbol.to_ascii_uppercase()));
    }

    pub fn unsubscribe(&self, symbol: &str) {
        self.send(FeedCommand::Unsubscribe(symbol.to_ascii_uppercase()));
    }

    /// Closes the socket with `1000` and stops the feed task.
    pub fn disconnect(&self) {
        self.send(FeedCommand::Disconnect);
    }

    fn send(&self, cmd: FeedCommand) {
        if self.tx.send(cmd).is_err() {
            debug!("Feed task already stopped, command dropped");
        }
    }
}

// ─── Service ──────────────────────────────────────────────────────────────────

pub struct RealtimeService {
    config: RealtimeConfig,
}

impl RealtimeService {
    pub fn new(config: RealtimeConfig) -> Self {
        if !config.token_looks_valid() {
            warn!("Realtime API token may have an invalid format (expected xxxxxxxx.xxxxxxxx)");
        }
        Self { config }
    }

    /// Spawns the connection task.  Events arrive on the returned receiver
    /// until the feed stops (manual disconnect, clean close, or `Offline`).
    pub fn connect(self) -> (FeedHandle, mpsc::Receiver<FeedEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(run_feed(self.config, cmd_rx, event_tx));

        (FeedHandle { tx: cmd_tx }, event_rx)
    }
}

// ─── Connection Loop ──────────────────────────────────────────────────────────

enum Outcome {
    /// We asked to stop.
    Shutdown,
    /// Peer closed with `1000`.
    Closed,
    /// Anything else: retry.
    Dropped,
}

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn run_feed(
    config:       RealtimeConfig,
    mut cmd_rx:   mpsc::UnboundedReceiver<FeedCommand>,
    event_tx:     mpsc::Sender<FeedEvent>,
) {
    let mut subscribed: BTreeSet<String> = BTreeSet::new();
    let mut failures: u32 = 0;

    loop {
        let status = if failures == 0 { FeedStatus::Connecting } else { FeedStatus::Reconnecting };
        if !emit(&event_tx, FeedEvent::Status(status)).await {
            return;
        }

        info!(url = %config.redacted_url(), attempt = failures, "Connecting to realtime feed");

        let url = match config.auth_url() {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "Realtime feed cannot start");
                emit(&event_tx, FeedEvent::Error(e)).await;
                emit(&event_tx, FeedEvent::Status(FeedStatus::Offline)).await;
                return;
            }
        };

        let outcome = match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                info!("Realtime feed connected");
                if !emit(&event_tx, FeedEvent::Status(FeedStatus::Connected)).await {
                    return;
                }
                // `failures` resets on the first tick, not on the handshake.
                pump(socket, &mut subscribed, &mut cmd_rx, &event_tx, &mut failures).await
            }
            Err(e) => {
                warn!(error = %e, "Realtime feed connection failed");
                emit(&event_tx, FeedEvent::Error(format!("connection error: {e}"))).await;
                Outcome::Dropped
            }
        };

        emit(&event_tx, FeedEvent::Status(FeedStatus::Disconnected)).await;

        match outcome {
            Outcome::Shutdown => {
                info!("Realtime feed disconnected");
                return;
            }
            Outcome::Closed => {
                info!("Realtime feed closed by server");
                return;
            }
            Outcome::Dropped => {}
        }

        failures += 1;
        if failures > config.max_reconnect_attempts {
            error!(attempts = config.max_reconnect_attempts, "Max reconnection attempts reached, feed offline");
            emit(&event_tx, FeedEvent::Error("max reconnection attempts reached".to_string())).await;
            emit(&event_tx, FeedEvent::Status(FeedStatus::Offline)).await;
            return;
        }

        let delay = backoff_delay(config.reconnect_base_delay, failures);
        info!(
            ?delay,
            attempt = failures,
            max = config.max_reconnect_attempts,
            "Reconnecting to realtime feed"
        );

        // Keep honouring commands while waiting.
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(FeedCommand::Subscribe(s))   => { subscribed.insert(s); }
                    Some(FeedCommand::Unsubscribe(s)) => { subscribed.remove(&s); }
                    Some(FeedCommand::Disconnect) | None => {
                        info!("Realtime feed stopped during backoff");
                        return;
                    }
                },
            }
        }
    }
}

/// Runs one open socket until it ends.
async fn pump(
    socket:     Socket,
    subscribed: &mut BTreeSet<String>,
    cmd_rx:     &mut mpsc::UnboundedReceiver<FeedCommand>,
    event_tx:   &mpsc::Sender<FeedEvent>,
    failures:   &mut u32,
) -> Outcome {
    let (mut write, mut read) = socket.split();

    for symbol in subscribed.iter() {
        if write.send(action("subscribe", symbol)).await.is_err() {
            return Outcome::Dropped;
        }
        debug!(%symbol, "Re-subscribed");
    }

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match parse_trade_frame(text.as_str(), Utc::now()) {
                        Ok(Some(tick)) => {
                            *failures = 0;
                            if !emit(event_tx, FeedEvent::Tick(tick)).await {
                                return Outcome::Shutdown;
                            }
                        }
                        Ok(None) => debug!(frame = %text.as_str(), "Non-price message"),
                        Err(e) => {
                            warn!(error = %e, "Unparseable realtime frame");
                            emit(event_tx, FeedEvent::Error(format!("malformed frame: {e}"))).await;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.as_ref().map(|f| u16::from(f.code));
                    info!(?code, "Realtime feed received close frame");
                    return match frame {
                        Some(f) if f.code == CloseCode::Normal => Outcome::Closed,
                        _ => Outcome::Dropped,
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Realtime feed read error");
                    return Outcome::Dropped;
                }
                None => return Outcome::Dropped,
            },

            cmd = cmd_rx.recv() => match cmd {
                Some(FeedCommand::Subscribe(symbol)) => {
                    if subscribed.insert(symbol.clone()) {
                        if write.send(action("subscribe", &symbol)).await.is_err() {
                            return Outcome::Dropped;
                        }
                        info!(%symbol, "Subscribed to realtime data");
                    }
                }
                Some(FeedCommand::Unsubscribe(symbol)) => {
                    if subscribed.remove(&symbol) {
                        if write.send(action("unsubscribe", &symbol)).await.is_err() {
                            return Outcome::Dropped;
                        }
                        info!(%symbol, "Unsubscribed from realtime data");
                    }
                }
                Some(FeedCommand::Disconnect) | None => {
                    subscribed.clear();
                    let close = CloseFrame {
                        code:   CloseCode::Normal,
                        reason: "Manual disconnect".into(),
                    };
                    let _ = write.send(Message::Close(Some(close))).await;
                    return Outcome::Shutdown;
                }
            },
        }
    }
}

fn action(kind: &str, symbol: &str) -> Message {
    Message::Text(json!({ "action": kind, "symbols": symbol }).to_string().into())
}

/// `false` once nobody is listening any more.
async fn emit(tx: &mpsc::Sender<FeedEvent>, event: FeedEvent) -> bool {
    tx.send(event).await.is_ok()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
