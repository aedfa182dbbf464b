//! # events
//!
//! Defines [`ChartEvent`], everything the chart session broadcasts to
//! `/ws/chart` subscribers.
//!
//! Events travel through a `tokio::sync::broadcast::Sender<String>` already
//! serialised, so slow WebSocket clients never force a clone of the series.

use serde::Serialize;

use crate::feed::FeedStatus;
use crate::models::PriceBar;
use crate::session::ChartSnapshot;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChartEvent {
    /// Sent once to each WebSocket client on connect.
    Snapshot {
        chart: Box<ChartSnapshot>,
    },

    /// A fetch for the current selection completed; replaces the whole series.
    SeriesLoaded {
        chart: Box<ChartSnapshot>,
    },

    /// A fetch for the current selection failed.  The chart is empty.
    LoadFailed {
        symbol: String,
        error:  String,
    },

    /// A live tick opened a new daily bar.
    BarAppended {
        symbol: String,
        bar:    PriceBar,
    },

    /// A live tick moved the last daily bar.
    LastBarUpdated {
        symbol: String,
        bar:    PriceBar,
    },

    ChartCleared,

    FeedStatus {
        status: FeedStatus,
    },
}

impl ChartEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::Value;

    #[test]
    fn test_tagged_wire_names() {
        let bar = PriceBar::flat(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(), 10.0);
        let json: Value = serde_json::from_str(
            &ChartEvent::LastBarUpdated { symbol: "AAPL".into(), bar }.to_json(),
        )
        .unwrap();
        assert_eq!(json["event"], "LAST_BAR_UPDATED");
        assert_eq!(json["bar"]["close"], 10.0);

        let json: Value = serde_json::from_str(&ChartEvent::ChartCleared.to_json()).unwrap();
        assert_eq!(json["event"], "CHART_CLEARED");

        let json: Value =
            serde_json::from_str(&ChartEvent::FeedStatus { status: FeedStatus::Offline }.to_json()).unwrap();
        assert_eq!(json, serde_json::json!({ "event": "FEED_STATUS", "status": "OFFLINE" }));
    }
}
