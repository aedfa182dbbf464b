//! # Finboard — Headless Financial Dashboard
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌──────────────┐  GET /price-data, /maxdate,    ┌──────────────────────┐
//!  │ Screener API │ ◀───── screeners ───────────── │  ApiClient           │
//!  └──────────────┘                                └──────────┬───────────┘
//!                                                             │ fetch (generation n)
//!  ┌──────────────┐  wss trades                    ┌──────────▼───────────┐
//!  │ EODHD feed   │ ─────────────────────────────▶ │  ChartSession        │
//!  └──────────────┘ ◀── subscribe / unsubscribe ── │  bars · EMA · ticks  │
//!                                                  └──────────┬───────────┘
//!  ┌──────────────┐  GET/POST/DELETE /api/chart               │ snapshot + ChartEvent
//!  │  Dashboard   │ ◀──────────────────────────────────────────┘
//!  │  (browser)   │  GET /api/watchlists/:id   ws://host/ws/chart
//!  └──────────────┘
//! ```
//!
//! ## Environment Variables
//!
//! | Variable                     | Default                               |
//! |------------------------------|---------------------------------------|
//! | `BIND_ADDR`                  | `127.0.0.1:3000`                      |
//! | `API_BASE_URL`               | `http://127.0.0.1:8080`               |
//! | `EODHD_API_TOKEN`            | unset (live updates disabled)         |
//! | `EODHD_EXCHANGE_CODE`        | `US` (exchange hours and holidays)    |
//! | `REALTIME_MARKET_HOURS_ONLY` | `true`                                |
//! | `RUST_LOG`                   | `finboard=debug,tower_http=info`      |
//!
//! See `config.rs` for the full list.

use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod calendar;
mod config;
mod engine;
mod error;
mod events;
mod feed;
mod models;
mod routes;
mod session;
mod state;

use config::Config;
use state::build_state;

// ─── Entry Point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env (optional — real env vars win) ───────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Initialise structured logging ─────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env()
            .add_directive("finboard=debug".parse()?)
            .add_directive("tower_http=info".parse()?)
            .add_directive("tokio_tungstenite=info".parse()?))
        .init();

    info!(
        r#"

  ╔═══════════════════════════════════════════════╗
  ║        FINBOARD — Market Dashboard            ║
  ║        Watchlists · EMA Charts · Live Bars    ║
  ╚═══════════════════════════════════════════════╝"#
    );

    // ── 3. Configuration ─────────────────────────────────────────────────────
    let config = Config::from_env()?;
    let addr = config.bind_addr;
    info!(
        api = %config.api_base_url,
        lookback_days = config.lookback_days,
        realtime = config.realtime.is_some(),
        exchange = config.exchange.as_ref().map(|e| e.exchange_code.as_str()),
        "Configuration loaded"
    );

    // ── 4. Shared state + background tasks ───────────────────────────────────
    let state = build_state(config)?;

    // ── 5. CORS (dashboard may be served from another origin) ────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 6. Router ────────────────────────────────────────────────────────────
    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    info!(?addr, "🚀 Finboard server starting");

    // ── 7. Serve ─────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
