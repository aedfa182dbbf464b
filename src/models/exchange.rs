//! # models::exchange
//!
//! Wire shape of the vendor's `GET /exchange-details/{code}` response.  Only
//! the parts the session clock needs are decoded; everything is optional.

use chrono::NaiveDate;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExchangeDetails {
    #[serde(rename = "Code", default)]
    pub code: Option<String>,

    #[serde(rename = "TradingHours", default)]
    pub trading_hours: Option<TradingHours>,

    /// Absent means "unknown", not "no holidays".
    #[serde(default)]
    pub holidays: Option<Vec<ExchangeHoliday>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradingHours {
    /// IANA zone of the exchange, e.g. `America/New_York`.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub sessions: Vec<RawSession>,
}

/// One trading window, times in UTC as `HH:MM` or `HH:MM:SS`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSession {
    #[serde(rename = "type")]
    pub kind:  String,
    pub start: String,
    pub end:   String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeHoliday {
    pub date: NaiveDate,
    #[serde(default)]
    pub name: String,
}
