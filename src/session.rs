//! # session — The chart session
//!
//! One task owns the bar series of the symbol on the chart.  Everything that
//! changes it arrives as a message:
//!
//! ```text
//!  POST /api/chart ──Select──▶ ┌──────────────┐ ──write──▶ RwLock<ChartSnapshot>
//!  DELETE /api/chart ─Clear──▶ │ ChartSession │
//!  fetch task ─────Loaded────▶ │  (owns bars) │ ──ChartEvent──▶ broadcast ─▶ /ws/chart
//!  RealtimeService ─FeedEvent▶ └──────────────┘ ──subscribe/unsubscribe──▶ FeedHandle
//! ```
//!
//! Each selection bumps `generation`.  Fetch results carry the generation
//! they were started under and are dropped if a newer selection exists.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::{
    api::{ApiClient, MAX_LOOKBACK_DAYS},
    calendar::MarketCalendar,
    config::Config,
    engine::{
        ema::{attach_emas, line, refresh_last, EmaPoint, EmaWindows},
        market_hours::ExchangeCalendar,
        reconciler::{reconcile, ChangeKind, DayBoundary, ReconcileError},
    },
    error::{ApiError, AppError},
    events::ChartEvent,
    feed::{FeedEvent, FeedHandle, FeedStatus},
    models::PriceBar,
};

const COMMAND_BUFFER: usize = 32;

/// How often live-subscription gating is re-evaluated against the exchange
/// calendar.
const MARKET_CHECK_INTERVAL: Duration = Duration::from_secs(60);

// ─── Snapshot ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartStatus {
    Idle,
    Loading,
    Ready,
    Failed,
}

/// What readers outside the session see.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSnapshot {
    pub generation: u64,
    pub symbol:     Option<String>,
    pub days:       u32,
    pub status:     ChartStatus,
    pub error:      Option<String>,
    pub bars:       Vec<PriceBar>,
    pub ema_fast:   Vec<EmaPoint>,
    pub ema_slow:   Vec<EmaPoint>,
    pub feed:       FeedStatus,
    /// Symbol currently subscribed on the live feed.
    pub live:       Option<String>,
}

impl ChartSnapshot {
    pub fn idle(days: u32, feed: FeedStatus) -> Self {
        Self {
            generation: 0,
            symbol:     None,
            days,
            status:     ChartStatus::Idle,
            error:      None,
            bars:       Vec::new(),
            ema_fast:   Vec::new(),
            ema_slow:   Vec::new(),
            feed,
            live:       None,
        }
    }
}

// ─── Settings & Commands ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub ema_windows:       EmaWindows,
    pub day_boundary:      DayBoundary,
    pub market_hours_only: bool,
    pub default_days:      u32,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            ema_windows:       config.ema_windows,
            day_boundary:      config.day_boundary,
            market_hours_only: config.market_hours_only,
            default_days:      config.lookback_days,
        }
    }
}

#[derive(Debug)]
pub enum SessionCommand {
    Select { symbol: String, days: Option<u32> },
    Clear,
}

/// A finished fetch, tagged with the selection it belongs to.
#[derive(Debug)]
struct Loaded {
    generation: u64,
    symbol:     String,
    result:     Result<Vec<PriceBar>, ApiError>,
}

/// Cloneable sender side, stored in `AppState`.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn select(&self, symbol: String, days: Option<u32>) -> Result<(), AppError> {
        self.send(SessionCommand::Select { symbol, days }).await
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        self.send(SessionCommand::Clear).await
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), AppError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| AppError::Unavailable("chart session is not running".to_string()))
    }
}

// ─── Session ──────────────────────────────────────────────────────────────────

pub struct ChartSession {
    settings:     SessionSettings,
    api:          ApiClient,
    calendar:     Arc<MarketCalendar>,
    feed:         Option<FeedHandle>,
    snapshot:     Arc<RwLock<ChartSnapshot>>,
    broadcast_tx: broadcast::Sender<String>,
    loaded_tx:    mpsc::Sender<Loaded>,
    loaded_rx:    Option<mpsc::Receiver<Loaded>>,

    generation:   u64,
    symbol:       Option<String>,
    days:         u32,
    status:       ChartStatus,
    error:        Option<String>,
    bars:         Vec<PriceBar>,
    feed_status:  FeedStatus,
    live:         Option<String>,
    /// Last market-hours verdict; only consulted with `market_hours_only`.
    market_open:  bool,
}

impl ChartSession {
    pub fn new(
        settings:     SessionSettings,
        api:          ApiClient,
        calendar:     Arc<MarketCalendar>,
        feed:         Option<FeedHandle>,
        snapshot:     Arc<RwLock<ChartSnapshot>>,
        broadcast_tx: broadcast::Sender<String>,
    ) -> Self {
        let (loaded_tx, loaded_rx) = mpsc::channel(COMMAND_BUFFER);
        let feed_status = if feed.is_some() { FeedStatus::Connecting } else { FeedStatus::Disabled };

        Self {
            settings,
            api,
            calendar,
            feed,
            snapshot,
            broadcast_tx,
            loaded_tx,
            loaded_rx: Some(loaded_rx),
            generation: 0,
            symbol: None,
            days: settings.default_days,
            status: ChartStatus::Idle,
            error: None,
            bars: Vec::new(),
            feed_status,
            live: None,
            market_open: ExchangeCalendar::default().session_at(Utc::now()).is_open(),
        }
    }

    /// Moves the session onto its own task.
    pub fn spawn(self, feed_events: Option<mpsc::Receiver<FeedEvent>>) -> SessionHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(self.run(rx, feed_events));
        SessionHandle { tx }
    }

    async fn run(
        mut self,
        mut commands:    mpsc::Receiver<SessionCommand>,
        mut feed_events: Option<mpsc::Receiver<FeedEvent>>,
    ) {
        let Some(mut loaded_rx) = self.loaded_rx.take() else { return };
        let mut market_check = tokio::time::interval(MARKET_CHECK_INTERVAL);

        info!("📈 Chart session started");
        self.publish().await;

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd).await,
                    None => break,
                },
                Some(loaded) = loaded_rx.recv() => self.on_loaded(loaded).await,
                event = next_feed_event(&mut feed_events) => match event {
                    Some(event) => self.on_feed_event(event).await,
                    None => {
                        debug!("Feed event stream ended");
                        feed_events = None;
                    }
                },
                _ = market_check.tick() => {
                    self.refresh_market_gate().await;
                    self.sync_live_subscription();
                }
            }
        }

        if let Some(feed) = &self.feed {
            feed.disconnect();
        }
        info!("Chart session stopped");
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    async fn on_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Select { symbol, days } => {
                let symbol = symbol.trim().to_ascii_uppercase();
                let days = days.unwrap_or(self.settings.default_days).clamp(1, MAX_LOOKBACK_DAYS);

                self.generation += 1;
                self.symbol = Some(symbol.clone());
                self.days = days;
                self.status = ChartStatus::Loading;
                self.error = None;
                self.bars.clear();

                info!(%symbol, days, generation = self.generation, "Chart selection");
                self.sync_live_subscription();
                self.publish().await;

                let api = self.api.clone();
                let tx = self.loaded_tx.clone();
                let generation = self.generation;
                tokio::spawn(async move {
                    let result = api.price_data(&symbol, days).await;
                    let _ = tx.send(Loaded { generation, symbol, result }).await;
                });
            }
            SessionCommand::Clear => {
                // Bumping the generation orphans any fetch still in flight.
                self.generation += 1;
                self.symbol = None;
                self.status = ChartStatus::Idle;
                self.error = None;
                self.bars.clear();

                info!(generation = self.generation, "Chart cleared");
                self.sync_live_subscription();
                self.publish().await;
                self.emit(&ChartEvent::ChartCleared);
            }
        }
    }

    async fn on_loaded(&mut self, loaded: Loaded) {
        if loaded.generation != self.generation {
            debug!(
                symbol = %loaded.symbol,
                stale = loaded.generation,
                current = self.generation,
                "Discarding superseded fetch"
            );
            return;
        }

        match loaded.result {
            Ok(mut bars) => {
                attach_emas(&mut bars, self.settings.ema_windows);
                info!(symbol = %loaded.symbol, bars = bars.len(), "✅ Series loaded");
                self.bars = bars;
                self.status = ChartStatus::Ready;
                self.publish().await;

                let chart = Box::new(self.snapshot.read().await.clone());
                self.emit(&ChartEvent::SeriesLoaded { chart });
            }
            // No history is not a failure: the chart starts empty and the
            // first live tick opens a bar.
            Err(ApiError::NotFound(message)) => {
                info!(symbol = %loaded.symbol, %message, "No history, waiting for live prices");
                self.bars.clear();
                self.status = ChartStatus::Ready;
                self.error = Some(message);
                self.publish().await;

                let chart = Box::new(self.snapshot.read().await.clone());
                self.emit(&ChartEvent::SeriesLoaded { chart });
            }
            Err(e) => {
                warn!(symbol = %loaded.symbol, error = %e, "Failed to load price data");
                self.bars.clear();
                self.status = ChartStatus::Failed;
                self.error = Some(e.to_string());
                self.publish().await;
                self.emit(&ChartEvent::LoadFailed {
                    symbol: loaded.symbol,
                    error:  e.to_string(),
                });
            }
        }
    }

    // ── Feed ──────────────────────────────────────────────────────────────────

    async fn on_feed_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Tick(tick) => {
                if self.status != ChartStatus::Ready {
                    debug!(symbol = %tick.symbol, status = ?self.status, "Tick ignored, series not ready");
                    return;
                }
                let Some(tracked) = self.symbol.clone() else { return };

                let today = self.settings.day_boundary.date_of(tick.observed_at);
                match reconcile(&mut self.bars, &tracked, &tick, today) {
                    Ok(done) => {
                        debug!(%tracked, price = tick.price, change = ?done.change, "Tick reconciled");
                        refresh_last(&mut self.bars, self.settings.ema_windows);
                        self.publish().await;
                        let bar = self.bars.last().cloned().unwrap_or(done.bar);
                        let event = match done.change {
                            ChangeKind::Append     => ChartEvent::BarAppended { symbol: tracked, bar },
                            ChangeKind::UpdateLast => ChartEvent::LastBarUpdated { symbol: tracked, bar },
                        };
                        self.emit(&event);
                    }
                    Err(ReconcileError::SymbolMismatch { got, .. }) => {
                        debug!(%tracked, %got, "Dropping tick for another symbol");
                    }
                    Err(e @ ReconcileError::StaleTick { .. }) => {
                        warn!(%tracked, error = %e, "Dropping stale tick");
                    }
                }
            }
            FeedEvent::Status(status) => {
                info!(?status, "Feed status");
                self.feed_status = status;
                // Reconnects replay subscriptions; Offline is terminal.
                if status == FeedStatus::Offline {
                    self.live = None;
                }
                self.publish().await;
                self.emit(&ChartEvent::FeedStatus { status });
            }
            FeedEvent::Error(message) => {
                warn!(%message, "Feed error");
            }
        }
    }

    /// Re-reads the exchange calendar.  Skipped when nothing is gated on it.
    async fn refresh_market_gate(&mut self) {
        if !self.settings.market_hours_only || self.feed.is_none() {
            return;
        }
        let session = self.calendar.current().await.session_at(Utc::now());
        if session.is_open() != self.market_open {
            info!(session = session.label(), "Market session changed");
        }
        self.market_open = session.is_open();
    }

    /// Points the live subscription at the selected symbol, or at nothing
    /// when no chart is shown or streaming is gated off.
    fn sync_live_subscription(&mut self) {
        let Some(feed) = &self.feed else { return };
        if self.feed_status == FeedStatus::Offline {
            return;
        }

        let streaming = !self.settings.market_hours_only || self.market_open;
        let wanted = self.symbol.clone().filter(|_| streaming);
        if wanted == self.live {
            return;
        }

        if let Some(old) = self.live.take() {
            info!(symbol = %old, "Unsubscribing live prices");
            feed.unsubscribe(&old);
        }
        if let Some(new) = wanted {
            info!(symbol = %new, "📡 Subscribing live prices");
            feed.subscribe(&new);
            self.live = Some(new);
        }
    }

    // ── Publication ───────────────────────────────────────────────────────────

    async fn publish(&self) {
        let ema_fast = line(&self.bars, |b| b.ema_fast);
        let ema_slow = line(&self.bars, |b| b.ema_slow);

        let mut guard = self.snapshot.write().await;
        *guard = ChartSnapshot {
            generation: self.generation,
            symbol:     self.symbol.clone(),
            days:       self.days,
            status:     self.status,
            error:      self.error.clone(),
            bars:       self.bars.clone(),
            ema_fast,
            ema_slow,
            feed:       self.feed_status,
            live:       self.live.clone(),
        };
    }

    fn emit(&self, event: &ChartEvent) {
        // No receivers is fine: nobody has the chart open.
        let _ = self.broadcast_tx.send(event.to_json());
    }
}

async fn next_feed_event(rx: &mut Option<mpsc::Receiver<FeedEvent>>) -> Option<FeedEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
