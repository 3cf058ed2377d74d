//! Validation queue endpoints
//!
//! Thin wrappers over `db::queue` for the admin UI.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::queue;
use crate::error::{ApiError, ApiResult};
use crate::models::{QueueAction, QueueCounts, QueueFilter, QueueStatus, ValidationQueueItem};
use crate::AppState;

/// GET /queue query parameters
#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    pub status: Option<String>,
    pub city: Option<String>,
    pub min_confidence: Option<i64>,
}

impl QueueQuery {
    fn into_filter(self) -> ApiResult<QueueFilter> {
        let status = self
            .status
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<QueueStatus>())
            .transpose()
            .map_err(ApiError::BadRequest)?;

        Ok(QueueFilter {
            status,
            city: self.city.filter(|c| !c.trim().is_empty()),
            min_confidence: self.min_confidence,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct QueueListResponse {
    pub items: Vec<ValidationQueueItem>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub action: String,
}

/// GET /queue
pub async fn list_queue(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> ApiResult<Json<QueueListResponse>> {
    let filter = query.into_filter()?;
    let items = queue::list_items(&state.db, &filter)
        .await
        .map_err(|e| state.note_error(e.into()))?;

    Ok(Json(QueueListResponse {
        total: items.len(),
        items,
    }))
}

/// GET /queue/stats
pub async fn queue_stats(State(state): State<AppState>) -> ApiResult<Json<QueueCounts>> {
    let counts = queue::counts(&state.db)
        .await
        .map_err(|e| state.note_error(e.into()))?;
    Ok(Json(counts))
}

/// GET /queue/:id
pub async fn get_queue_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ValidationQueueItem>> {
    let id = parse_id(&id)?;
    let item = queue::get_item(&state.db, id)
        .await
        .map_err(|e| state.note_error(e.into()))?;
    Ok(Json(item))
}

/// POST /queue/:id/transition
pub async fn transition_queue_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TransitionRequest>, JsonRejection>,
) -> ApiResult<Json<ValidationQueueItem>> {
    let id = parse_id(&id)?;
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let action = request
        .action
        .parse::<QueueAction>()
        .map_err(ApiError::BadRequest)?;

    let item = queue::transition(&state.db, id, action)
        .await
        .map_err(|e| state.note_error(e.into()))?;
    Ok(Json(item))
}

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid queue item id: {}", raw)))
}

/// Build queue routes
pub fn queue_routes() -> Router<AppState> {
    Router::new()
        .route("/queue", get(list_queue))
        .route("/queue/stats", get(queue_stats))
        .route("/queue/:id", get(get_queue_item))
        .route("/queue/:id/transition", post(transition_queue_item))
}
