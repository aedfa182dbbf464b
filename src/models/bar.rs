//! # models::bar
//!
//! Defines [`PriceBar`], one trading day of OHLCV data for the symbol that
//! the chart session is currently showing.
//!
//! A series of bars arrives from `/price-data/{symbol}` as an immutable
//! snapshot and is replaced wholesale on the next fetch.  The only in-place
//! mutation ever applied is the live-tick reconciliation step in
//! [`crate::engine::reconciler`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ─── PriceBar ─────────────────────────────────────────────────────────────────

/// A single daily candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Trading day, serialised as `YYYY-MM-DD`.  Unique and ascending within a series.
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Shares traded.  Never derived from live ticks.
    pub volume: u64,

    /// Fast EMA (21 by default).  `None` until the window has seeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ema_fast: Option<f64>,

    /// Slow EMA (200 by default).  `None` until the window has seeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ema_slow: Option<f64>,
}

impl PriceBar {
    /// A flat bar where every price equals `price`, as synthesised from the
    /// first tick of a day with no history.
    pub fn flat(date: NaiveDate, price: f64) -> Self {
        Self {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0,
            ema_fast: None,
            ema_slow: None,
        }
    }
}

// ─── Wire Format ──────────────────────────────────────────────────────────────

/// Row shape returned by `GET /price-data/{symbol}`.
///
/// The API names the date `time` (TradingView convention) and may carry its
/// own server-side EMA columns.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceDataRow {
    pub time:    NaiveDate,
    pub open:    f64,
    pub high:    f64,
    pub low:     f64,
    pub close:   f64,
    pub volume:  u64,
    #[serde(default)]
    pub ema_21:  Option<f64>,
    #[serde(default)]
    pub ema_200: Option<f64>,
}

impl From<PriceDataRow> for PriceBar {
    fn from(row: PriceDataRow) -> Self {
        Self {
            date:     row.time,
            open:     row.open,
            high:     row.high,
            low:      row.low,
            close:    row.close,
            volume:   row.volume,
            ema_fast: row.ema_21,
            ema_slow: row.ema_200,
        }
    }
}
