//! `GET /health`
//!
//! Reports "degraded" when the store does not answer. Pending review count is
//! included so monitoring can alert on a growing backlog.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::db::queue;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    /// Pending queue items; absent when the store is unreachable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_reviews: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = Utc::now()
        .signed_duration_since(state.startup_time)
        .num_seconds()
        .max(0) as u64;

    let pending_reviews = queue::counts(&state.db).await.ok().map(|c| c.pending);

    Json(HealthResponse {
        status: if pending_reviews.is_some() { "ok" } else { "degraded" },
        module: "pawmap-discovery",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        pending_reviews,
        last_error: state.last_error(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
