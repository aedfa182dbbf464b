//! # routes::market
//!
//! Liveness, the API's latest trading date, and the exchange session clock.

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

use crate::{error::AppError, state::SharedState};

/// GET /api/health
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let chart = state.chart.read().await;
    let uptime = (Utc::now() - state.started_at).num_seconds();

    Json(json!({
        "ok":          true,
        "uptime_secs": uptime,
        "feed":        chart.feed,
        "symbol":      chart.symbol,
        "ws_clients":  state.broadcast_tx.receiver_count(),
    }))
}

/// GET /api/maxdate
pub async fn max_date(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    let date = state.api.max_date().await?;
    Ok(Json(json!({ "ok": true, "date": date })))
}

/// GET /api/market/status
///
/// `calendar` is `exchange` when vendor hours and holidays are in use and
/// `fallback` otherwise.
pub async fn status(State(state): State<SharedState>) -> impl IntoResponse {
    let now = Utc::now();
    let calendar = state.calendar.current().await;
    let session = calendar.session_at(now);
    let streaming = !state.config.market_hours_only || session.is_open();

    Json(json!({
        "ok":        true,
        "session":   session,
        "label":     session.label(),
        "open":      session.is_open(),
        "streaming": streaming,
        "calendar":  calendar.source,
        "timezone":  calendar.timezone.name(),
        "as_of":     now,
    }))
}
