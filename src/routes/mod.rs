//! HTTP and WebSocket surface of the dashboard.

pub mod chart;
pub mod market;
pub mod watchlist;

use axum::{routing::get, Router};

use crate::state::SharedState;

/// All routes, without middleware or state attached.
pub fn router() -> Router<SharedState> {
    Router::new()
        // ── Service ──────────────────────────────────────────────────────────
        .route("/api/health",         get(market::health))
        .route("/api/maxdate",        get(market::max_date))
        .route("/api/market/status",  get(market::status))
        // ── Watchlists ───────────────────────────────────────────────────────
        .route("/api/watchlists",     get(watchlist::list_watchlists))
        .route("/api/watchlists/:id", get(watchlist::watchlist_rows))
        // ── Chart ────────────────────────────────────────────────────────────
        .route(
            "/api/chart",
            get(chart::get_chart).post(chart::select_chart).delete(chart::clear_chart),
        )
        .route("/ws/chart",           get(chart::ws_chart))
}
