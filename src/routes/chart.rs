//! # routes::chart
//!
//! | Method    | Path         | Description                                    |
//! |-----------|--------------|------------------------------------------------|
//! | GET       | `/api/chart` | Current snapshot (bars, EMA lines, status)     |
//! | POST      | `/api/chart` | `{symbol, days?}`: load a symbol, go live      |
//! | DELETE    | `/api/chart` | Clear the chart, drop the live subscription    |
//! | GET (WS)  | `/ws/chart`  | Snapshot on connect, then `ChartEvent` frames  |

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::{
    api::MAX_LOOKBACK_DAYS,
    error::AppError,
    events::ChartEvent,
    state::SharedState,
};

const MAX_SYMBOL_LEN: usize = 15;

#[derive(Debug, Deserialize)]
pub struct ChartRequest {
    pub symbol: String,
    #[serde(default)]
    pub days:   Option<u32>,
}

// ─── GET /api/chart ───────────────────────────────────────────────────────────

pub async fn get_chart(State(state): State<SharedState>) -> impl IntoResponse {
    let chart = state.chart.read().await;
    Json(json!({ "ok": true, "chart": *chart }))
}

// ─── POST /api/chart ──────────────────────────────────────────────────────────

/// Starts loading `symbol`.  The series arrives asynchronously: poll
/// `GET /api/chart` or listen for `SERIES_LOADED` on `/ws/chart`.
pub async fn select_chart(
    State(state): State<SharedState>,
    body: Result<Json<ChartRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = body?;
    let symbol = req.symbol.trim().to_ascii_uppercase();
    validate_symbol(&symbol)?;

    if let Some(days) = req.days {
        if days == 0 || days > MAX_LOOKBACK_DAYS {
            return Err(AppError::BadRequest(format!("days must be 1–{MAX_LOOKBACK_DAYS}, got {days}")));
        }
    }

    state.session.select(symbol.clone(), req.days).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "ok":     true,
            "symbol": symbol,
            "days":   req.days.unwrap_or(state.config.lookback_days),
        })),
    ))
}

fn validate_symbol(symbol: &str) -> Result<(), AppError> {
    if symbol.is_empty() {
        return Err(AppError::BadRequest("symbol is required".into()));
    }
    if symbol.len() > MAX_SYMBOL_LEN
        || !symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(AppError::BadRequest(format!("'{symbol}' is not a valid ticker")));
    }
    Ok(())
}

// ─── DELETE /api/chart ────────────────────────────────────────────────────────

pub async fn clear_chart(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    state.session.clear().await?;
    Ok(Json(json!({ "ok": true, "message": "Chart cleared." })))
}

// ─── GET /ws/chart ────────────────────────────────────────────────────────────

pub async fn ws_chart(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    // Subscribe before reading the snapshot so nothing falls in between.
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 Chart WebSocket client connected");

    let snapshot = ChartEvent::Snapshot {
        chart: Box::new(state.chart.read().await.clone()),
    }
    .to_json();

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Chart WS client lagged, skipped {n} events");
                    }
                    Err(_) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 Chart WebSocket client disconnected");
}
