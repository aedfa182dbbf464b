//! # models::tick
//!
//! Defines [`LiveTick`], the last-trade observation pushed by the vendor
//! WebSocket for a subscribed symbol.
//!
//! Ticks are transient: the chart session folds each one into the last daily
//! bar (see [`crate::engine::reconciler`]) and drops it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single streamed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveTick {
    /// The ticker, e.g. `"AAPL"`.
    pub symbol: String,

    /// Last trade price.
    pub price: f64,

    /// Trade size, when the vendor reports one.  Carried for logging only;
    /// it is never folded into bar volume.
    #[serde(default)]
    pub size: Option<u64>,

    /// Vendor event time.  Falls back to `observed_at` when the frame has none.
    pub timestamp: DateTime<Utc>,

    /// Wall-clock instant at which this process received the frame.
    /// The reconciler derives "today" from this, not from `timestamp`.
    pub observed_at: DateTime<Utc>,
}

impl LiveTick {
    /// Builds a tick observed right now.  Handy for tests and manual injection.
    pub fn now(symbol: &str, price: f64) -> Self {
        let now = Utc::now();
        Self {
            symbol: symbol.to_string(),
            price,
            size: None,
            timestamp: now,
            observed_at: now,
        }
    }
}

// ─── Vendor Frame ─────────────────────────────────────────────────────────────

/// Numbers arrive either as JSON numbers or as numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Numeric::Number(n) => Some(*n),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// US trade frame: `{"s":"AAPL","p":227.01,"v":100,"t":1726070400000,"ms":"open","c":[12]}`.
#[derive(Debug, Deserialize)]
struct TradeFrame {
    s:  Option<String>,
    p:  Option<Numeric>,
    v:  Option<Numeric>,
    t:  Option<i64>,
}

/// Parses one text frame from the vendor socket.
///
/// * `Err`      — the frame is not JSON at all.
/// * `Ok(None)` — valid JSON but not a trade (auth acks, status messages,
///   frames with a missing or non-positive price).
/// * `Ok(Some)` — a usable tick.
pub fn parse_trade_frame(
    text: &str,
    observed_at: DateTime<Utc>,
) -> Result<Option<LiveTick>, serde_json::Error> {
    let frame: TradeFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        // Arrays, bare strings and the like are still valid JSON, just not trades.
        Err(e) if e.is_data() => return Ok(None),
        Err(e) => return Err(e),
    };

    let (Some(symbol), Some(price)) = (frame.s, frame.p.as_ref().and_then(Numeric::as_f64)) else {
        return Ok(None);
    };

    if symbol.is_empty() || !price.is_finite() || price <= 0.0 {
        return Ok(None);
    }

    let size = frame
        .v
        .as_ref()
        .and_then(Numeric::as_f64)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64);

    let timestamp = frame
        .t
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(observed_at);

    Ok(Some(LiveTick {
        symbol,
        price,
        size,
        timestamp,
        observed_at,
    }))
}
