//! # engine::reconciler
//!
//! Folds live trade ticks into the daily candle series of the symbol on the
//! chart.
//!
//! ```text
//!            bars empty ─────────────▶ NoHistory  → append flat bar
//!  last.date == today   ─────────────▶ SameDay    → update last bar
//!  last.date <  today   ─────────────▶ NewDay     → append bar opened at prev close
//!  last.date >  today   ─────────────▶ Stale      → reject, history untouched
//! ```
//!
//! Volume is never touched: the vendor trade stream is not a reliable source
//! of daily volume, so synthesised bars start at `0` and updates keep the
//! fetched figure.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;

use crate::models::{LiveTick, PriceBar};

// ─── Day Boundary ─────────────────────────────────────────────────────────────

/// Which calendar decides when "today" starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayBoundary {
    /// The host's local time zone.
    Local,
    /// A fixed IANA zone, e.g. `America/New_York`.
    Zone(Tz),
}

impl DayBoundary {
    /// Calendar date of `instant` on this boundary.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            DayBoundary::Local   => instant.with_timezone(&chrono::Local).date_naive(),
            DayBoundary::Zone(tz) => instant.with_timezone(tz).date_naive(),
        }
    }
}

// ─── State & Outcome ──────────────────────────────────────────────────────────

/// Where the series stands relative to the tick's day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleState {
    NoHistory,
    SameDay,
    NewDay,
    Stale,
}

impl CandleState {
    pub fn classify(bars: &[PriceBar], today: NaiveDate) -> Self {
        match bars.last() {
            None => CandleState::NoHistory,
            Some(last) if last.date == today => CandleState::SameDay,
            Some(last) if last.date < today  => CandleState::NewDay,
            Some(_) => CandleState::Stale,
        }
    }
}

/// How a renderer should apply the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Append,
    UpdateLast,
}

/// Result of one successful reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub change: ChangeKind,
    /// The appended or updated bar (a copy of `bars.last()`).
    pub bar: PriceBar,
}

#[derive(Debug, Error, PartialEq)]
pub enum ReconcileError {
    #[error("tick for {got} does not belong to tracked symbol {tracked}")]
    SymbolMismatch { tracked: String, got: String },

    #[error("tick day {today} is older than last bar {last}")]
    StaleTick { today: NaiveDate, last: NaiveDate },
}

// ─── Transition ───────────────────────────────────────────────────────────────

/// Applies `tick` to `bars` in place.
///
/// `today` is the tick's arrival date on the configured [`DayBoundary`];
/// passing it in keeps this function pure and clock-free.
pub fn reconcile(
    bars:    &mut Vec<PriceBar>,
    tracked: &str,
    tick:    &LiveTick,
    today:   NaiveDate,
) -> Result<Reconciled, ReconcileError> {
    if tick.symbol != tracked {
        return Err(ReconcileError::SymbolMismatch {
            tracked: tracked.to_string(),
            got:     tick.symbol.clone(),
        });
    }

    let price = tick.price;

    let change = match CandleState::classify(bars, today) {
        CandleState::NoHistory => {
            bars.push(PriceBar::flat(today, price));
            ChangeKind::Append
        }
        CandleState::SameDay => {
            if let Some(last) = bars.last_mut() {
                last.close = price;
                last.high = last.high.max(price);
                last.low = last.low.min(price);
            }
            ChangeKind::UpdateLast
        }
        CandleState::NewDay => {
            let prev_close = bars.last().map(|b| b.close).unwrap_or(price);
            bars.push(PriceBar {
                date:     today,
                open:     prev_close,
                high:     prev_close.max(price),
                low:      prev_close.min(price),
                close:    price,
                volume:   0,
                ema_fast: None,
                ema_slow: None,
            });
            ChangeKind::Append
        }
        CandleState::Stale => {
            let last = bars.last().map(|b| b.date).unwrap_or(today);
            return Err(ReconcileError::StaleTick { today, last });
        }
    };

    // Every arm above leaves at least one bar behind.
    let bar = bars.last().cloned().unwrap_or_else(|| PriceBar::flat(today, price));
    Ok(Reconciled { change, bar })
}

// ─── Tests ────────────────────────────────────────────────────────────────────
