//! pawmap-discovery library interface
//!
//! Establishment discovery, review queue and import pipeline for the
//! dog-friendly directory. The binary wires these together; integration
//! tests use them directly.

pub mod api;
pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod import;
pub mod models;
pub mod normalize;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex, PoisonError};
use tower_http::trace::TraceLayer;
use tracing::error;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last server-side handler error
    ///
    /// Held only to swap a string, never across an await.
    pub last_error: Arc<Mutex<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            startup_time: Utc::now(),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Remember server-side failures for `/health`; client errors pass through
    pub fn note_error(&self, err: ApiError) -> ApiError {
        if matches!(err, ApiError::Internal(_) | ApiError::Common(_)) {
            error!(error = %err, "Request failed");
            *self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
        }
        err
    }

    /// Last error recorded by [`Self::note_error`]
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::queue_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
