//! # state
//!
//! AppState shared by every Axum handler: configuration, the API client, the
//! exchange calendar, the chart session's control handle and its published
//! snapshot, plus the broadcast channel `/ws/chart` clients subscribe to.
//!
//! Handlers never touch the bar series directly.  They read
//! [`ChartSnapshot`] and send commands through [`SessionHandle`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tracing::info;

use crate::api::ApiClient;
use crate::calendar::MarketCalendar;
use crate::config::Config;
use crate::feed::{FeedStatus, RealtimeService};
use crate::session::{ChartSession, ChartSnapshot, SessionHandle, SessionSettings};

/// Capacity of the chart event channel before slow clients start lagging.
const BROADCAST_CAPACITY: usize = 256;

// ─── AppState ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Upstream ──────────────────────────────────────────────────────────────
    /// Screener / price-data API client (connection-pooled, cheap to clone).
    pub api: ApiClient,
    /// Exchange hours and holidays, cached.
    pub calendar: Arc<MarketCalendar>,

    // ── Chart Session ─────────────────────────────────────────────────────────
    pub session: SessionHandle,
    /// Written only by the session task.
    pub chart: Arc<RwLock<ChartSnapshot>>,

    // ── Monitor / WebSocket ───────────────────────────────────────────────────
    /// Pre-serialised [`crate::events::ChartEvent`] JSON.
    pub broadcast_tx: broadcast::Sender<String>,

    pub started_at: DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;

/// Builds the state and starts the background tasks (chart session, and the
/// realtime feed when a vendor token is configured).
///
/// Must run inside a Tokio runtime.
pub fn build_state(config: Config) -> anyhow::Result<SharedState> {
    let api = ApiClient::new(&config.api_base_url, config.api_timeout)?;
    let calendar = Arc::new(MarketCalendar::new(config.exchange.as_ref(), config.api_timeout)?);
    let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

    let (feed, feed_events) = match &config.realtime {
        Some(realtime) => {
            info!(url = %realtime.redacted_url(), "Realtime feed enabled");
            let (handle, events) = RealtimeService::new(realtime.clone()).connect();
            (Some(handle), Some(events))
        }
        None => {
            info!("No EODHD_API_TOKEN set, charts will not update live");
            (None, None)
        }
    };

    let initial_feed = if feed.is_some() { FeedStatus::Connecting } else { FeedStatus::Disabled };
    let chart = Arc::new(RwLock::new(ChartSnapshot::idle(config.lookback_days, initial_feed)));

    let session = ChartSession::new(
        SessionSettings::from(&config),
        api.clone(),
        calendar.clone(),
        feed,
        chart.clone(),
        broadcast_tx.clone(),
    )
    .spawn(feed_events);

    Ok(Arc::new(AppState {
        config: Arc::new(config),
        api,
        calendar,
        session,
        chart,
        broadcast_tx,
        started_at: Utc::now(),
    }))
}
