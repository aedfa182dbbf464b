//! # calendar — Exchange trading calendar from the vendor
//!
//! `GET {base}/exchange-details/{code}?api_token=…&fmt=json` supplies the
//! exchange's zone, session windows and holiday list.  The result is cached
//! for `cache_ttl`.  Failed lookups are not cached and fall back to the
//! built-in New York hours with fixed-date holidays.

use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use reqwest::Url;
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, warn};

use crate::engine::market_hours::ExchangeCalendar;
use crate::error::ApiError;
use crate::models::ExchangeDetails;

pub const DEFAULT_EXCHANGE_API_URL: &str = "https://eodhd.com/api";

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeConfig {
    /// Vendor REST root, e.g. `https://eodhd.com/api`.
    pub base_url:      String,
    pub api_token:     String,
    /// Exchange code, `US` for the consolidated US market.
    pub exchange_code: String,
    pub cache_ttl:     Duration,
}

struct Source {
    base:   Url,
    token:  String,
    code:   String,
    ttl:    Duration,
}

/// Shared calendar lookup.  Without a source it always answers with the
/// fallback calendar.
pub struct MarketCalendar {
    http:    reqwest::Client,
    source:  Option<Source>,
    timeout: Duration,
    cache:   RwLock<Option<(ExchangeCalendar, Instant)>>,
}

impl MarketCalendar {
    pub fn new(config: Option<&ExchangeConfig>, timeout: Duration) -> anyhow::Result<Self> {
        let source = match config {
            Some(cfg) => {
                let base = Url::parse(&cfg.base_url)
                    .with_context(|| format!("invalid exchange API URL '{}'", cfg.base_url))?;
                if base.cannot_be_a_base() {
                    bail!("exchange API URL '{}' cannot carry a path", cfg.base_url);
                }
                Some(Source {
                    base,
                    token: cfg.api_token.clone(),
                    code:  cfg.exchange_code.clone(),
                    ttl:   cfg.cache_ttl,
                })
            }
            None => None,
        };

        Ok(Self {
            http: reqwest::Client::new(),
            source,
            timeout,
            cache: RwLock::new(None),
        })
    }

    /// Calendar in force now: cached exchange data, a fresh lookup, or the
    /// fallback when the lookup fails.
    pub async fn current(&self) -> ExchangeCalendar {
        let Some(source) = &self.source else {
            return ExchangeCalendar::default();
        };

        if let Some((calendar, expires)) = self.cache.read().await.as_ref() {
            if Instant::now() < *expires {
                return calendar.clone();
            }
        }

        let now: DateTime<Utc> = Utc::now();
        match self.fetch(source).await {
            Ok(details) => {
                let calendar = ExchangeCalendar::from_details(&details, now.date_naive());
                debug!(
                    exchange = %source.code,
                    sessions = calendar.sessions.len(),
                    holidays = calendar.holidays.as_ref().map(|h| h.len()),
                    "Exchange calendar refreshed"
                );
                *self.cache.write().await = Some((calendar.clone(), Instant::now() + source.ttl));
                calendar
            }
            Err(e) => {
                warn!(exchange = %source.code, error = %e, "Exchange details unavailable, using built-in hours");
                ExchangeCalendar::default()
            }
        }
    }

    async fn fetch(&self, source: &Source) -> Result<ExchangeDetails, ApiError> {
        let mut url = source.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["exchange-details", source.code.as_str()]);
        }
        // Reported in errors; the token is only added to the request.
        let url_str = url.to_string();
        url.query_pairs_mut()
            .append_pair("api_token", &source.token)
            .append_pair("fmt", "json");

        let resp = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.without_url()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| ApiError::Transport(e.without_url()))?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url:    url_str,
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| ApiError::Decode { url: url_str, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query},
        http::StatusCode,
        routing::get,
        Json, Router,
    };
    use chrono::TimeZone;
    use chrono_tz::America::New_York;
    use serde_json::json;
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use crate::engine::market_hours::{CalendarSource, MarketSession};

    fn ny(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        New_York
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn calendar(base_url: String, ttl: Duration) -> MarketCalendar {
        let cfg = ExchangeConfig {
            base_url,
            api_token:     "demo.token".into(),
            exchange_code: "US".into(),
            cache_ttl:     ttl,
        };
        MarketCalendar::new(Some(&cfg), Duration::from_secs(5)).unwrap()
    }

    fn counting_upstream(hits: Arc<AtomicUsize>) -> Router {
        Router::new().route(
            "/api/exchange-details/:code",
            get(move |Path(code): Path<String>, Query(q): Query<HashMap<String, String>>| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(code, "US");
                    assert_eq!(q.get("api_token").map(String::as_str), Some("demo.token"));
                    assert_eq!(q.get("fmt").map(String::as_str), Some("json"));
                    Json(json!({
                        "Name": "USA Stocks",
                        "Code": "US",
                        "TradingHours": {
                            "timezone": "America/New_York",
                            "sessions": [{"type": "regular", "start": "14:30", "end": "21:00"}]
                        },
                        "holidays": [{"date": "2025-11-27", "name": "Thanksgiving Day"}]
                    }))
                }
            }),
        )
    }

    #[tokio::test]
    async fn test_exchange_holidays_close_the_market_and_are_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let cal = calendar(serve(counting_upstream(hits.clone())).await, Duration::from_secs(3600));

        let current = cal.current().await;
        assert_eq!(current.source, CalendarSource::Exchange);
        assert_eq!(current.session_at(ny(2025, 11, 27, 11, 0)), MarketSession::Closed);
        assert_eq!(current.session_at(ny(2025, 11, 28, 11, 0)), MarketSession::Regular);

        cal.current().await;
        cal.current().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_cache_refetches() {
        let hits = Arc::new(AtomicUsize::new(0));
        let cal = calendar(serve(counting_upstream(hits.clone())).await, Duration::ZERO);

        cal.current().await;
        cal.current().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_lookup_falls_back_and_is_not_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/api/exchange-details/:code",
            get(move || {
                let hits = counter.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::INTERNAL_SERVER_ERROR, "maintenance")
                }
            }),
        );
        let cal = calendar(serve(router).await, Duration::from_secs(3600));

        let current = cal.current().await;
        assert_eq!(current, ExchangeCalendar::default());
        assert_eq!(current.session_at(ny(2025, 7, 4, 11, 0)), MarketSession::Closed);

        cal.current().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_does_not_leak_token() {
        let router = Router::new().route(
            "/api/exchange-details/:code",
            get(|| async { (StatusCode::UNAUTHORIZED, "bad token") }),
        );
        let cal = calendar(serve(router).await, Duration::from_secs(3600));
        let source = cal.source.as_ref().unwrap();

        let err = cal.fetch(source).await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 401, .. }));
        assert!(!err.to_string().contains("demo.token"));
    }

    #[tokio::test]
    async fn test_without_source_uses_fallback() {
        let cal = MarketCalendar::new(None, Duration::from_secs(1)).unwrap();
        assert_eq!(cal.current().await.source, CalendarSource::Fallback);
        assert!(MarketCalendar::new(
            Some(&ExchangeConfig {
                base_url:      "not a url".into(),
                api_token:     "t".into(),
                exchange_code: "US".into(),
                cache_ttl:     Duration::from_secs(1),
            }),
            Duration::from_secs(1),
        )
        .is_err());
    }
}
