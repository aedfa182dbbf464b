//! # api — Screener & price-data HTTP client
//!
//! Thin typed wrapper over the dashboard API:
//!
//! | Call            | Endpoint                                  |
//! |-----------------|-------------------------------------------|
//! | `max_date`      | `GET /maxdate`                            |
//! | `price_data`    | `GET /price-data/{SYMBOL}?days=N`         |
//! | `screener`      | `GET /{screener}?date=…&limit=…&…`        |
//!
//! The API is an external collaborator; payloads are decoded leniently where
//! it has been seen to vary (max date shape, screener row shape).

use std::time::Duration;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use reqwest::Url;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use crate::error::ApiError;
use crate::models::{screener::RawRow, PriceBar, PriceDataRow, Screener, ScreenerRow};

/// Upper bound the price endpoint accepts for `days`.
pub const MAX_LOOKBACK_DAYS: u32 = 365;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MaxDateBody {
    Plain(NaiveDate),
    Wrapped { date: NaiveDate },
}

/// Shared, cheaply clonable API client (reqwest pools connections internally).
#[derive(Debug, Clone)]
pub struct ApiClient {
    http:    reqwest::Client,
    base:    Url,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("invalid API base URL '{base_url}'"))?;
        if base.cannot_be_a_base() {
            bail!("API base URL '{base_url}' cannot carry a path");
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            timeout,
        })
    }

    /// Latest trading date the API has data for.
    pub async fn max_date(&self) -> Result<NaiveDate, ApiError> {
        let url = self.endpoint(&["maxdate"]);
        match self.get_json::<MaxDateBody>(url, &[]).await {
            Ok(MaxDateBody::Plain(date) | MaxDateBody::Wrapped { date }) => Ok(date),
            Err(ApiError::Status { status: 404, .. }) => {
                Err(ApiError::NotFound("API has no max date".to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Daily bars for `symbol`, oldest first.  An empty series is an error:
    /// there is nothing to chart.
    pub async fn price_data(&self, symbol: &str, days: u32) -> Result<Vec<PriceBar>, ApiError> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let days = days.clamp(1, MAX_LOOKBACK_DAYS);
        let url = self.endpoint(&["price-data", &symbol]);

        let rows: Vec<PriceDataRow> = match self.get_json(url, &[("days", days.to_string())]).await {
            Err(ApiError::Status { status: 404, .. }) => Vec::new(),
            other => other?,
        };
        if rows.is_empty() {
            return Err(ApiError::NotFound(format!("No price data available for {symbol}")));
        }

        let mut bars: Vec<PriceBar> = rows.into_iter().map(PriceBar::from).collect();
        // Ascending and unique per date, whatever order the rows came in.
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);

        debug!(symbol = %symbol, days, bars = bars.len(), "Price data fetched");
        Ok(bars)
    }

    /// Runs a screener for `date`.  "No matches" (HTTP 404) is an empty list.
    pub async fn screener(
        &self,
        screener: Screener,
        date: NaiveDate,
        limit: Option<u32>,
    ) -> Result<Vec<ScreenerRow>, ApiError> {
        let segments: Vec<&str> = screener.path().split('/').filter(|s| !s.is_empty()).collect();
        let url = self.endpoint(&segments);

        let mut query = vec![("date", date.format("%Y-%m-%d").to_string())];
        query.extend(screener.extra_param());
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let raw: Vec<RawRow> = match self.get_json(url, &query).await {
            Err(ApiError::Status { status: 404, .. }) => {
                debug!(?screener, %date, "Screener returned no matches");
                return Ok(Vec::new());
            }
            other => other?,
        };

        Ok(raw.into_iter().filter_map(RawRow::into_row).collect())
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url_str = url.to_string();

        let resp = self
            .http
            .get(url)
            .query(query)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

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

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query},
        http::StatusCode as AxumStatus,
        routing::get,
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn serve(router: Router) -> ApiClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        ApiClient::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_max_date_accepts_both_shapes() {
        let plain = serve(Router::new().route("/maxdate", get(|| async { Json(json!("2025-06-02")) }))).await;
        assert_eq!(plain.max_date().await.unwrap(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());

        let wrapped = serve(Router::new().route(
            "/maxdate",
            get(|| async { Json(json!({ "date": "2025-05-30" })) }),
        ))
        .await;
        assert_eq!(wrapped.max_date().await.unwrap(), NaiveDate::from_ymd_opt(2025, 5, 30).unwrap());
    }

    #[tokio::test]
    async fn test_price_data_sorts_and_passes_days() {
        let router = Router::new().route(
            "/price-data/:symbol",
            get(|Path(symbol): Path<String>, Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(symbol, "AAPL");
                assert_eq!(q.get("days").map(String::as_str), Some("365"));
                Json(json!([
                    {"time":"2025-06-03","open":2.0,"high":2.0,"low":2.0,"close":2.0,"volume":20},
                    {"time":"2025-06-02","open":1.0,"high":1.0,"low":1.0,"close":1.0,"volume":10,"ema_21":null}
                ]))
            }),
        );
        let client = serve(router).await;

        let bars = client.price_data("aapl", 9_000).await.unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].date < bars[1].date);
        assert_eq!(bars[0].volume, 10);
    }

    #[tokio::test]
    async fn test_price_data_empty_or_missing_is_not_found() {
        let router = Router::new()
            .route("/price-data/EMPTY", get(|| async { Json(json!([])) }))
            .route(
                "/price-data/GONE",
                get(|| async { (AxumStatus::NOT_FOUND, Json(json!({"detail":"No price data"}))) }),
            );
        let client = serve(router).await;

        assert!(matches!(client.price_data("EMPTY", 90).await, Err(ApiError::NotFound(_))));
        assert!(matches!(client.price_data("GONE", 90).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_screener_query_and_no_match() {
        let router = Router::new()
            .route(
                "/new-highs",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    let echo: Value = json!([
                        {"symbol":"NVDA","type":"Common Stock"},
                        q.get("period").cloned().unwrap_or_default(),
                        q.get("limit").cloned().unwrap_or_default(),
                        q.get("date").cloned().unwrap_or_default()
                    ]);
                    Json(echo)
                }),
            )
            .route(
                "/gapup",
                get(|| async { (AxumStatus::NOT_FOUND, Json(json!({"detail":"No gap up data"}))) }),
            );
        let client = serve(router).await;
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();

        let rows = client
            .screener(Screener::NewHighs(crate::models::Period::Year), date, Some(25))
            .await
            .unwrap();
        let symbols: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, ["NVDA", "252", "25", "2025-06-02"]);

        assert!(client.screener(Screener::GapUp, date, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_and_bad_payload() {
        let router = Router::new()
            .route("/gapdown", get(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "db down") }))
            .route("/maxdate", get(|| async { "<html>" }));
        let client = serve(router).await;
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();

        match client.screener(Screener::GapDown, date, None).await {
            Err(ApiError::Status { status, body, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "db down");
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert!(matches!(client.max_date().await, Err(ApiError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        assert!(matches!(client.max_date().await, Err(ApiError::Transport(_))));
    }
}
