//! # config — Runtime configuration from environment variables
//!
//! `.env` is loaded by `main` before this runs; real environment variables win.

use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, Context};
use chrono_tz::Tz;

use crate::calendar::{ExchangeConfig, DEFAULT_EXCHANGE_API_URL};
use crate::engine::{ema::EmaWindows, reconciler::DayBoundary};
use crate::feed::RealtimeConfig;

const DEFAULT_WS_URL: &str = "wss://ws.eodhistoricaldata.com/ws/us";

/// Everything the dashboard needs to start.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the dashboard's own HTTP/WS surface listens on.
    pub bind_addr:         SocketAddr,
    /// Screener / price-data API, without trailing slash.
    pub api_base_url:      String,
    pub api_timeout:       Duration,
    /// Days of history requested per chart load (1–365).
    pub lookback_days:     u32,
    pub ema_windows:       EmaWindows,
    /// `None` when no vendor token is configured: charts stay static.
    pub realtime:          Option<RealtimeConfig>,
    /// Vendor exchange-details lookup; `None` uses built-in hours and holidays.
    pub exchange:          Option<ExchangeConfig>,
    /// Only subscribe to live prices while a US session is open.
    pub market_hours_only: bool,
    pub day_boundary:      DayBoundary,
    /// Symbols of the static `favorites` watchlist.
    pub favorites:         Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key → value source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind_addr: SocketAddr = get("BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse()
            .context("BIND_ADDR must be host:port")?;

        let api_base_url = get("API_BASE_URL")
            .unwrap_or_else(|| "http://127.0.0.1:8080".to_string())
            .trim_end_matches('/')
            .to_string();
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            bail!("API_BASE_URL must be an http(s) URL, got '{api_base_url}'");
        }

        let api_timeout = Duration::from_secs(parse_or(&get, "API_TIMEOUT_SECS", 10u64)?);

        let lookback_days: u32 = parse_or(&get, "PRICE_LOOKBACK_DAYS", 365u32)?;
        let lookback_days = lookback_days.clamp(1, 365);

        let ema_windows = EmaWindows {
            fast: parse_or(&get, "EMA_FAST_WINDOW", 21usize)?,
            slow: parse_or(&get, "EMA_SLOW_WINDOW", 200usize)?,
        };
        if ema_windows.fast == 0 || ema_windows.slow == 0 {
            bail!("EMA windows must be positive");
        }

        let token = get("EODHD_API_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let realtime = match &token {
            Some(token) => Some(RealtimeConfig {
                url:                    get("EODHD_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
                api_token:              token.clone(),
                max_reconnect_attempts: parse_or(&get, "REALTIME_MAX_RECONNECTS", 5u32)?,
                reconnect_base_delay:   Duration::from_millis(parse_or(&get, "REALTIME_RECONNECT_BASE_MS", 1000u64)?),
            }),
            None => None,
        };

        let exchange = match &token {
            Some(token) => Some(ExchangeConfig {
                base_url:      get("EODHD_API_URL")
                    .unwrap_or_else(|| DEFAULT_EXCHANGE_API_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                api_token:     token.clone(),
                exchange_code: get("EODHD_EXCHANGE_CODE")
                    .map(|c| c.trim().to_ascii_uppercase())
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| "US".to_string()),
                cache_ttl:     Duration::from_secs(parse_or(&get, "EXCHANGE_CACHE_HOURS", 24u64)? * 3600),
            }),
            None => None,
        };

        let market_hours_only = get("REALTIME_MARKET_HOURS_ONLY")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let day_boundary = match get("DAY_BOUNDARY_TZ").filter(|v| !v.trim().is_empty()) {
            Some(name) => DayBoundary::Zone(
                name.trim()
                    .parse::<Tz>()
                    .map_err(|e| anyhow::anyhow!("DAY_BOUNDARY_TZ '{name}' is not an IANA zone: {e}"))?,
            ),
            None => DayBoundary::Local,
        };

        let favorites = get("WATCHLIST_FAVORITES")
            .unwrap_or_else(|| "AAPL,MSFT,GOOGL".to_string())
            .split(',')
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            bind_addr,
            api_base_url,
            api_timeout,
            lookback_days,
            ema_windows,
            realtime,
            exchange,
            market_hours_only,
            day_boundary,
            favorites,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("{key} must be a number, got '{raw}'")),
        None => Ok(default),
    }
}
