//! # engine::watchlist
//!
//! Watchlist catalogue plus the client-side filter/sort applied to rows
//! before they are handed to the dashboard.
//!
//! Screener-backed lists pull rows from the API for a given date; the
//! `favorites` list is static and comes from configuration.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::models::{CrossDirection, Period, Screener, ScreenerRow, SignalSide};

// ─── Catalogue ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum WatchlistSource {
    Screener(Screener),
    Static(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Watchlist {
    pub id:     &'static str,
    pub name:   &'static str,
    pub source: WatchlistSource,
}

const SCREENER_LISTS: [(&str, &str, Screener); 13] = [
    ("new-highs-63",          "New 63-Day Highs",      Screener::NewHighs(Period::Quarter)),
    ("new-highs-252",         "New 52-Week Highs",     Screener::NewHighs(Period::Year)),
    ("new-lows-63",           "New 63-Day Lows",       Screener::NewLows(Period::Quarter)),
    ("new-lows-252",          "New 52-Week Lows",      Screener::NewLows(Period::Year)),
    ("gap-up",                "Gap Up",                Screener::GapUp),
    ("gap-down",              "Gap Down",              Screener::GapDown),
    ("swing-high-cross-up",   "Swing High Cross Up",   Screener::SwingHighCross(CrossDirection::Up)),
    ("swing-high-cross-down", "Swing High Cross Down", Screener::SwingHighCross(CrossDirection::Down)),
    ("swing-low-cross-up",    "Swing Low Cross Up",    Screener::SwingLowCross(CrossDirection::Up)),
    ("swing-low-cross-down",  "Swing Low Cross Down",  Screener::SwingLowCross(CrossDirection::Down)),
    ("buy-signals",           "New Buy Signals",       Screener::NewSignals(SignalSide::Buy)),
    ("sell-signals",          "New Sell Signals",      Screener::NewSignals(SignalSide::Sell)),
    ("rs-52-week-high",       "52-Week RS High",       Screener::RelativeStrength52Week),
];

/// Every watchlist the dashboard offers, in display order.
pub fn catalog(favorites: &[String]) -> Vec<Watchlist> {
    let mut lists = vec![Watchlist {
        id:     "favorites",
        name:   "Favorites",
        source: WatchlistSource::Static(favorites.to_vec()),
    }];
    lists.extend(SCREENER_LISTS.iter().map(|&(id, name, screener)| Watchlist {
        id,
        name,
        source: WatchlistSource::Screener(screener),
    }));
    lists
}

pub fn find(id: &str, favorites: &[String]) -> Option<Watchlist> {
    catalog(favorites).into_iter().find(|w| w.id == id)
}

// ─── Filter & Sort ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Symbol,
    LastPrice,
    Change,
    PercentChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Client-side view options for a list of rows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RowView {
    /// Case-insensitive symbol substring.
    pub q:     Option<String>,
    pub sort:  Option<SortKey>,
    #[serde(default)]
    pub order: SortOrder,
}

/// Filters then stably sorts `rows`.  Rows lacking the sort key go last
/// regardless of order.
pub fn apply_view(mut rows: Vec<ScreenerRow>, view: &RowView) -> Vec<ScreenerRow> {
    if let Some(needle) = view.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let needle = needle.to_ascii_uppercase();
        rows.retain(|r| r.symbol.to_ascii_uppercase().contains(&needle));
    }

    let Some(key) = view.sort else { return rows };

    rows.sort_by(|a, b| {
        let ord = match key {
            SortKey::Symbol => Some(a.symbol.to_ascii_uppercase().cmp(&b.symbol.to_ascii_uppercase())),
            SortKey::LastPrice     => cmp_missing_last(a.last_price, b.last_price),
            SortKey::Change        => cmp_missing_last(a.price_change, b.price_change),
            SortKey::PercentChange => cmp_missing_last(a.percent_change, b.percent_change),
        };
        match (ord, view.order) {
            (Some(o), SortOrder::Asc)  => o,
            (Some(o), SortOrder::Desc) => o.reverse(),
            // one side missing: already resolved, not subject to order
            (None, _) => missing_rank(key, a).cmp(&missing_rank(key, b)),
        }
    });
    rows
}

/// `None` when exactly one side is missing (caller ranks by presence instead).
fn cmp_missing_last(a: Option<f64>, b: Option<f64>) -> Option<Ordering> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
        (None, None) => Some(Ordering::Equal),
        _ => None,
    }
}

fn missing_rank(key: SortKey, row: &ScreenerRow) -> u8 {
    let present = match key {
        SortKey::Symbol        => true,
        SortKey::LastPrice     => row.last_price.is_some(),
        SortKey::Change        => row.price_change.is_some(),
        SortKey::PercentChange => row.percent_change.is_some(),
    };
    if present { 0 } else { 1 }
}
