//! # models::screener
//!
//! Screener queries against the upstream API and the rows they return.
//!
//! Every screener is a `GET` with a mandatory `date` and optional `limit`;
//! some carry one extra discriminating parameter (lookback period, cross
//! direction, signal side).  [`Screener`] captures that as a closed enum so
//! callers can never build an invalid combination.

use serde::{Deserialize, Serialize};

// ─── Parameters ───────────────────────────────────────────────────────────────

/// Lookback for new-high / new-low screeners.  The API only knows 63 and 252.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Quarter,
    Year,
}

impl Period {
    pub fn days(self) -> u32 {
        match self {
            Period::Quarter => 63,
            Period::Year    => 252,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossDirection {
    Up,
    Down,
}

impl CrossDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            CrossDirection::Up   => "up",
            CrossDirection::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSide {
    Buy,
    Sell,
}

impl SignalSide {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalSide::Buy  => "buy",
            SignalSide::Sell => "sell",
        }
    }
}

// ─── Screener ─────────────────────────────────────────────────────────────────

/// One server-side screener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screener {
    NewHighs(Period),
    NewLows(Period),
    GapUp,
    GapDown,
    SwingHighCross(CrossDirection),
    SwingLowCross(CrossDirection),
    NewSignals(SignalSide),
    RelativeStrength52Week,
}

impl Screener {
    /// Path relative to the API base URL.
    pub fn path(self) -> &'static str {
        match self {
            Screener::NewHighs(_)            => "/new-highs",
            Screener::NewLows(_)             => "/new-lows",
            Screener::GapUp                  => "/gapup",
            Screener::GapDown                => "/gapdown",
            Screener::SwingHighCross(_)      => "/swing-high-cross",
            Screener::SwingLowCross(_)       => "/swing-low-cross",
            Screener::NewSignals(_)          => "/new-signals",
            Screener::RelativeStrength52Week => "/relative-strength/52-week",
        }
    }

    /// The screener-specific query pair, if any (`date` and `limit` are added by the client).
    pub fn extra_param(self) -> Option<(&'static str, String)> {
        match self {
            Screener::NewHighs(p) | Screener::NewLows(p) => Some(("period", p.days().to_string())),
            Screener::SwingHighCross(d) | Screener::SwingLowCross(d) => {
                Some(("direction", d.as_str().to_string()))
            }
            Screener::NewSignals(s) => Some(("signal", s.as_str().to_string())),
            Screener::GapUp | Screener::GapDown | Screener::RelativeStrength52Week => None,
        }
    }
}

// ─── Rows ─────────────────────────────────────────────────────────────────────

/// A symbol returned by a screener, optionally with price context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerRow {
    pub symbol: String,

    /// Instrument class reported by the API (`"Common Stock"`, `"ETF"`, …).
    #[serde(rename = "type", default)]
    pub asset_type: Option<String>,

    #[serde(default)]
    pub last_price: Option<f64>,
    #[serde(default)]
    pub prev_close: Option<f64>,
    #[serde(default)]
    pub price_change: Option<f64>,
    #[serde(default)]
    pub percent_change: Option<f64>,
}

impl ScreenerRow {
    pub fn bare(symbol: impl Into<String>) -> Self {
        Self {
            symbol:         symbol.into(),
            asset_type:     None,
            last_price:     None,
            prev_close:     None,
            price_change:   None,
            percent_change: None,
        }
    }
}

/// Everything the API has been seen to return for a list entry.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawRow {
    Symbol(String),
    Full(ScreenerRow),
    Alias {
        ticker: Option<String>,
        name:   Option<String>,
    },
}

impl RawRow {
    /// Normalises to a [`ScreenerRow`]; entries with no usable symbol are dropped.
    pub(crate) fn into_row(self) -> Option<ScreenerRow> {
        match self {
            RawRow::Symbol(s) if !s.trim().is_empty() => Some(ScreenerRow::bare(s.trim())),
            RawRow::Symbol(_) => None,
            RawRow::Full(row) => Some(row),
            RawRow::Alias { ticker, name } => ticker.or(name).map(ScreenerRow::bare),
        }
    }
}
