//! # engine::market_hours
//!
//! US equity session calendar.
//!
//! | Session      | Default local time (`America/New_York`) |
//! |--------------|-----------------------------------------|
//! | Pre-market   | 04:00 – 09:30                           |
//! | Regular      | 09:30 – 16:00                           |
//! | After hours  | 16:00 – 20:00                           |
//!
//! An [`ExchangeCalendar`] built from vendor exchange details replaces the
//! windows, zone and holiday list.  Without one, weekends and a short list
//! of fixed-date holidays are closed and floating holidays are not known.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::{America::New_York, Tz};
use serde::Serialize;

use crate::models::ExchangeDetails;

/// Fixed `(month, day)` closures used when the exchange's list is unknown.
const FIXED_HOLIDAYS: [(u32, u32); 3] = [(1, 1), (7, 4), (12, 25)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarketSession {
    Closed,
    PreMarket,
    Regular,
    AfterHours,
}

impl MarketSession {
    pub fn is_open(self) -> bool {
        !matches!(self, MarketSession::Closed)
    }

    pub fn label(self) -> &'static str {
        match self {
            MarketSession::Closed     => "Market Closed",
            MarketSession::PreMarket  => "Pre-Market",
            MarketSession::Regular    => "Market Open",
            MarketSession::AfterHours => "After Hours",
        }
    }
}

/// Maps a vendor session type onto [`MarketSession`].  Unknown types count
/// as regular trading.
pub fn session_kind(raw: &str) -> MarketSession {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pre-market" | "premarket" | "pre_market" => MarketSession::PreMarket,
        "after-hours" | "afterhours" | "after_hours" | "extended" | "post" => MarketSession::AfterHours,
        _ => MarketSession::Regular,
    }
}

// ─── Calendar ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarSource {
    /// Built from vendor exchange details.
    Exchange,
    /// Built-in hours and fixed holidays.
    Fallback,
}

/// A trading window in exchange-local wall-clock time, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub kind:  MarketSession,
    pub start: NaiveTime,
    pub end:   NaiveTime,
}

impl SessionWindow {
    fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t < self.end
        } else {
            // wraps past midnight
            t >= self.start || t < self.end
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeCalendar {
    pub timezone: Tz,
    pub sessions: Vec<SessionWindow>,
    /// `None` falls back to [`FIXED_HOLIDAYS`].
    pub holidays: Option<BTreeSet<NaiveDate>>,
    pub source:   CalendarSource,
}

impl Default for ExchangeCalendar {
    fn default() -> Self {
        Self {
            timezone: New_York,
            sessions: vec![
                window(MarketSession::PreMarket, hm(4, 0), hm(9, 30)),
                window(MarketSession::Regular, hm(9, 30), hm(16, 0)),
                window(MarketSession::AfterHours, hm(16, 0), hm(20, 0)),
            ],
            holidays: None,
            source:   CalendarSource::Fallback,
        }
    }
}

impl ExchangeCalendar {
    /// Builds a calendar from vendor details.  Session times arrive in UTC
    /// and are converted to exchange-local time as of `today`.
    ///
    /// No usable sessions → regular hours only.
    pub fn from_details(details: &ExchangeDetails, today: NaiveDate) -> Self {
        let hours = details.trading_hours.as_ref();
        let timezone = hours
            .and_then(|h| h.timezone.as_deref())
            .and_then(|name| name.parse::<Tz>().ok())
            .unwrap_or(New_York);

        let local = |raw: &str| -> Option<NaiveTime> {
            let utc = NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
                .ok()?;
            Some(timezone.from_utc_datetime(&today.and_time(utc)).time())
        };

        let mut sessions: Vec<SessionWindow> = hours
            .map(|h| h.sessions.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|s| Some(window(session_kind(&s.kind), local(&s.start)?, local(&s.end)?)))
            .collect();
        if sessions.is_empty() {
            sessions.push(window(MarketSession::Regular, hm(9, 30), hm(16, 0)));
        }

        let holidays = details
            .holidays
            .as_ref()
            .map(|list| list.iter().map(|h| h.date).collect());

        Self { timezone, sessions, holidays, source: CalendarSource::Exchange }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        match &self.holidays {
            Some(days) => days.contains(&date),
            None => FIXED_HOLIDAYS.contains(&(date.month(), date.day())),
        }
    }

    /// Session in force at `instant`.
    pub fn session_at(&self, instant: DateTime<Utc>) -> MarketSession {
        let local = instant.with_timezone(&self.timezone);

        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) || self.is_holiday(local.date_naive()) {
            return MarketSession::Closed;
        }

        let t = hm(local.hour(), local.minute());
        self.sessions
            .iter()
            .find(|w| w.contains(t))
            .map(|w| w.kind)
            .unwrap_or(MarketSession::Closed)
    }
}

fn window(kind: MarketSession, start: NaiveTime, end: NaiveTime) -> SessionWindow {
    SessionWindow { kind, start, end }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exchange::{ExchangeHoliday, RawSession, TradingHours};

    /// New York wall-clock → UTC instant.
    fn ny(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        New_York
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn fallback(instant: DateTime<Utc>) -> MarketSession {
        ExchangeCalendar::default().session_at(instant)
    }

    fn details(sessions: &[(&str, &str, &str)], holidays: Option<&[&str]>) -> ExchangeDetails {
        ExchangeDetails {
            code: Some("US".into()),
            trading_hours: Some(TradingHours {
                timezone: Some("America/New_York".into()),
                sessions: sessions
                    .iter()
                    .map(|(kind, start, end)| RawSession {
                        kind:  kind.to_string(),
                        start: start.to_string(),
                        end:   end.to_string(),
                    })
                    .collect(),
            }),
            holidays: holidays.map(|days| {
                days.iter()
                    .map(|d| ExchangeHoliday { date: d.parse().unwrap(), name: String::new() })
                    .collect()
            }),
        }
    }

    #[test]
    fn test_session_boundaries() {
        // Tuesday 2025-06-03
        assert_eq!(fallback(ny(2025, 6, 3, 3, 59)), MarketSession::Closed);
        assert_eq!(fallback(ny(2025, 6, 3, 4, 0)), MarketSession::PreMarket);
        assert_eq!(fallback(ny(2025, 6, 3, 9, 29)), MarketSession::PreMarket);
        assert_eq!(fallback(ny(2025, 6, 3, 9, 30)), MarketSession::Regular);
        assert_eq!(fallback(ny(2025, 6, 3, 15, 59)), MarketSession::Regular);
        assert_eq!(fallback(ny(2025, 6, 3, 16, 0)), MarketSession::AfterHours);
        assert_eq!(fallback(ny(2025, 6, 3, 19, 59)), MarketSession::AfterHours);
        assert_eq!(fallback(ny(2025, 6, 3, 20, 0)), MarketSession::Closed);
    }

    #[test]
    fn test_weekend_and_holiday_closed() {
        assert_eq!(fallback(ny(2025, 6, 7, 11, 0)), MarketSession::Closed); // Saturday
        assert_eq!(fallback(ny(2025, 6, 8, 11, 0)), MarketSession::Closed); // Sunday
        assert_eq!(fallback(ny(2025, 12, 25, 11, 0)), MarketSession::Closed); // Thursday
        assert!(!fallback(ny(2025, 7, 4, 11, 0)).is_open());
    }

    #[test]
    fn test_dst_is_respected() {
        // 14:00 UTC is 09:00 EST in January (pre-market) but 10:00 EDT in June (regular).
        let winter = Utc.with_ymd_and_hms(2025, 1, 14, 14, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2025, 6, 3, 14, 0, 0).unwrap();
        assert_eq!(fallback(winter), MarketSession::PreMarket);
        assert_eq!(fallback(summer), MarketSession::Regular);
    }

    #[test]
    fn test_labels() {
        assert_eq!(MarketSession::AfterHours.label(), "After Hours");
        assert!(MarketSession::PreMarket.is_open());
        assert!(!MarketSession::Closed.is_open());
    }

    #[test]
    fn test_session_type_mapping() {
        assert_eq!(session_kind("Premarket"), MarketSession::PreMarket);
        assert_eq!(session_kind("pre_market"), MarketSession::PreMarket);
        assert_eq!(session_kind("main"), MarketSession::Regular);
        assert_eq!(session_kind("POST"), MarketSession::AfterHours);
        assert_eq!(session_kind("extended"), MarketSession::AfterHours);
        assert_eq!(session_kind("auction"), MarketSession::Regular);
    }

    #[test]
    fn test_exchange_sessions_are_converted_from_utc() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        let cal = ExchangeCalendar::from_details(
            &details(&[("pre-market", "08:00", "13:30"), ("regular", "13:30", "20:00")], Some(&[])),
            today,
        );
        assert_eq!(cal.source, CalendarSource::Exchange);
        assert_eq!(cal.sessions[1].start, NaiveTime::from_hms_opt(9, 30, 0).unwrap());

        assert_eq!(cal.session_at(ny(2025, 6, 3, 9, 30)), MarketSession::Regular);
        assert_eq!(cal.session_at(ny(2025, 6, 3, 5, 0)), MarketSession::PreMarket);
        // no after-hours window published
        assert_eq!(cal.session_at(ny(2025, 6, 3, 17, 0)), MarketSession::Closed);
    }

    #[test]
    fn test_exchange_holidays_replace_fixed_list() {
        let today = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();
        let cal = ExchangeCalendar::from_details(
            &details(&[("regular", "14:30", "21:00")], Some(&["2025-11-27"])),
            today,
        );
        // Thanksgiving is closed, which the fixed list does not know
        assert_eq!(cal.session_at(ny(2025, 11, 27, 11, 0)), MarketSession::Closed);
        assert_eq!(fallback(ny(2025, 11, 27, 11, 0)), MarketSession::Regular);
        // the published list is authoritative
        assert_eq!(cal.session_at(ny(2025, 11, 28, 11, 0)), MarketSession::Regular);
        assert!(!cal.is_holiday(NaiveDate::from_ymd_opt(2025, 12, 25).unwrap()));
    }

    #[test]
    fn test_missing_sessions_mean_regular_hours_only() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        let cal = ExchangeCalendar::from_details(&details(&[], None), today);

        assert_eq!(cal.session_at(ny(2025, 6, 3, 8, 0)), MarketSession::Closed);
        assert_eq!(cal.session_at(ny(2025, 6, 3, 10, 0)), MarketSession::Regular);
        // holidays unknown → fixed list applies
        assert!(cal.is_holiday(NaiveDate::from_ymd_opt(2025, 7, 4).unwrap()));
    }
}
