//! # routes::watchlist
//!
//! | Method | Path                    | Description                                 |
//! |--------|-------------------------|---------------------------------------------|
//! | GET    | `/api/watchlists`       | Catalogue of lists                          |
//! | GET    | `/api/watchlists/:id`   | Rows; `date?`, `limit?`, `q?`, `sort?`, `order?` |
//!
//! Screener lists default to the API's latest trading date when `date` is
//! omitted.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    engine::watchlist::{apply_view, catalog, find, RowView, SortKey, SortOrder, WatchlistSource},
    error::AppError,
    models::ScreenerRow,
    state::SharedState,
};

#[derive(Debug, Default, Deserialize)]
pub struct RowsQuery {
    pub date:  Option<NaiveDate>,
    pub limit: Option<u32>,
    pub q:     Option<String>,
    pub sort:  Option<SortKey>,
    #[serde(default)]
    pub order: SortOrder,
}

// ─── GET /api/watchlists ──────────────────────────────────────────────────────

pub async fn list_watchlists(State(state): State<SharedState>) -> impl IntoResponse {
    let lists: Vec<_> = catalog(&state.config.favorites)
        .into_iter()
        .map(|w| {
            let kind = match w.source {
                WatchlistSource::Screener(_) => "screener",
                WatchlistSource::Static(_)   => "static",
            };
            json!({ "id": w.id, "name": w.name, "kind": kind })
        })
        .collect();

    Json(json!({ "ok": true, "count": lists.len(), "watchlists": lists }))
}

// ─── GET /api/watchlists/:id ──────────────────────────────────────────────────

pub async fn watchlist_rows(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    query: Result<Query<RowsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query?;
    let list = find(&id, &state.config.favorites)
        .ok_or_else(|| AppError::NotFound(format!("watchlist '{id}'")))?;

    if query.limit == Some(0) {
        return Err(AppError::BadRequest("limit must be positive".into()));
    }

    let (date, rows) = match list.source {
        WatchlistSource::Static(symbols) => {
            let rows = symbols.into_iter().map(ScreenerRow::bare).collect::<Vec<_>>();
            (None, rows)
        }
        WatchlistSource::Screener(screener) => {
            let date = match query.date {
                Some(date) => date,
                None => state.api.max_date().await?,
            };
            let rows = state.api.screener(screener, date, query.limit).await?;
            (Some(date), rows)
        }
    };

    let view = RowView { q: query.q, sort: query.sort, order: query.order };
    let rows = apply_view(rows, &view);
    debug!(watchlist = %list.id, ?date, rows = rows.len(), "Watchlist rows");

    Ok(Json(json!({
        "ok":    true,
        "id":    list.id,
        "name":  list.name,
        "date":  date,
        "count": rows.len(),
        "rows":  rows,
    })))
}
