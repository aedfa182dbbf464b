//! # error
//!
//! Centralised error types.
//!
//! * [`ApiError`] — anything that can go wrong talking to the screener /
//!   price-data API.
//! * [`AppError`] — what every Axum handler returns.  Its `IntoResponse` impl
//!   turns failures into structured JSON bodies so the chart renderer always
//!   gets a machine-readable response.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// ─── Upstream API ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection refused, DNS failure, timeout, …
    #[error("API unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },

    /// The body was not the JSON shape we expected.
    #[error("malformed payload from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The API has nothing for this request.
    #[error("{0}")]
    NotFound(String),
}

// ─── Handler Errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppError {
    /// The request was well-formed but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unknown watchlist or similar.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The upstream API failed.
    #[error("Upstream error: {0}")]
    Upstream(#[from] ApiError),

    /// A background component (chart session, feed) is not running.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

// Extractor rejections get the same JSON body as handler errors.
impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::Upstream(ApiError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "ok":    false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
