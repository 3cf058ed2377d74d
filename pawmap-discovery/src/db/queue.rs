//! Validation queue persistence
//!
//! The status column is only ever changed by [`transition`], through a
//! compare-and-set on `status = 'pending'`. Two reviewers acting on the same
//! item at once cannot both succeed.

use chrono::{DateTime, SecondsFormat, Utc};
use pawmap_common::Error;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use thiserror::Error as ThisError;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    CandidatePlace, QueueAction, QueueCounts, QueueFilter, QueueStatus, ValidationQueueItem,
};
use crate::normalize::slugify;
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const SELECT_ITEM: &str = "SELECT id, city_slug, status, candidate, created_at, reviewed_at FROM validation_queue";

/// Queue operation failure
#[derive(Debug, ThisError)]
pub enum QueueError {
    #[error("Queue item not found: {0}")]
    NotFound(Uuid),

    #[error("Cannot {action} queue item {id}: status is already {current}")]
    InvalidTransition {
        id: Uuid,
        current: QueueStatus,
        action: QueueAction,
    },

    #[error(transparent)]
    Store(#[from] Error),
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        QueueError::Store(Error::Database(err))
    }
}

/// Result of enqueueing discovery output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueOutcome {
    pub enqueued: usize,
    /// Candidates whose name is already pending for the city
    pub duplicates: usize,
}

/// Persist a new item as given
pub async fn insert_item(pool: &SqlitePool, item: &ValidationQueueItem) -> Result<(), QueueError> {
    let candidate_json = serde_json::to_string(&item.candidate).map_err(Error::Json)?;
    let name_key = slugify(&item.candidate.name);
    let created_at = format_timestamp(&item.created_at);
    let reviewed_at = item.reviewed_at.as_ref().map(format_timestamp);
    let (candidate_json, name_key) = (&candidate_json, &name_key);
    let (created_at, reviewed_at) = (&created_at, &reviewed_at);

    retry_on_lock("queue insert", DEFAULT_MAX_LOCK_WAIT_MS, || async move {
        sqlx::query(
            r#"
            INSERT INTO validation_queue (
                id, city_slug, status, name, name_key, confidence, candidate, created_at, reviewed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(&item.city)
        .bind(item.status.as_str())
        .bind(&item.candidate.name)
        .bind(name_key)
        .bind(item.candidate.confidence)
        .bind(candidate_json)
        .bind(created_at)
        .bind(reviewed_at)
        .execute(pool)
        .await?;
        Ok::<(), Error>(())
    })
    .await?;

    Ok(())
}

/// Enqueue discovery output for `city` as pending items
///
/// A candidate whose slugified name is already pending for the city is
/// skipped, including repeats within `candidates` itself.
pub async fn enqueue_candidates(
    pool: &SqlitePool,
    city: &str,
    candidates: &[CandidatePlace],
) -> Result<EnqueueOutcome, QueueError> {
    let mut outcome = EnqueueOutcome::default();

    for candidate in candidates {
        let name_key = slugify(&candidate.name);
        let already_pending: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM validation_queue WHERE city_slug = ? AND name_key = ? AND status = 'pending' LIMIT 1",
        )
        .bind(city)
        .bind(&name_key)
        .fetch_optional(pool)
        .await?;

        if already_pending.is_some() {
            debug!(city = %city, name = %candidate.name, "Candidate already pending, not enqueued");
            outcome.duplicates += 1;
            continue;
        }

        insert_item(pool, &ValidationQueueItem::new(city, candidate.clone())).await?;
        outcome.enqueued += 1;
    }

    info!(
        city = %city,
        enqueued = outcome.enqueued,
        duplicates = outcome.duplicates,
        "Candidates enqueued for review"
    );
    Ok(outcome)
}

/// Load one item
pub async fn load_item(pool: &SqlitePool, id: Uuid) -> Result<Option<ValidationQueueItem>, QueueError> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ITEM))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| item_from_row(&r)).transpose()
}

/// Load one item, `NotFound` when absent
pub async fn get_item(pool: &SqlitePool, id: Uuid) -> Result<ValidationQueueItem, QueueError> {
    load_item(pool, id).await?.ok_or(QueueError::NotFound(id))
}

/// Items matching `filter`, oldest first
pub async fn list_items(
    pool: &SqlitePool,
    filter: &QueueFilter,
) -> Result<Vec<ValidationQueueItem>, QueueError> {
    let mut query = QueryBuilder::<Sqlite>::new(SELECT_ITEM);
    query.push(" WHERE 1 = 1");

    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(city) = &filter.city {
        query.push(" AND city_slug = ").push_bind(city.as_str());
    }
    if let Some(min_confidence) = filter.min_confidence {
        query.push(" AND confidence >= ").push_bind(min_confidence);
    }
    query.push(" ORDER BY created_at, rowid");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(item_from_row).collect()
}

/// Per-status totals
pub async fn counts(pool: &SqlitePool) -> Result<QueueCounts, QueueError> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM validation_queue GROUP BY status")
        .fetch_all(pool)
        .await?;

    let mut counts = QueueCounts::default();
    for row in rows {
        let status: String = row.get("status");
        let n: i64 = row.get("n");
        match status.parse::<QueueStatus>() {
            Ok(QueueStatus::Pending) => counts.pending = n,
            Ok(QueueStatus::Approved) => counts.approved = n,
            Ok(QueueStatus::Rejected) => counts.rejected = n,
            Err(e) => return Err(Error::Internal(e).into()),
        }
    }
    Ok(counts)
}

/// Apply a reviewer action to a pending item
///
/// Fails with `NotFound` for unknown ids and `InvalidTransition` when the item
/// already left `pending`. A failed transition changes nothing.
pub async fn transition(
    pool: &SqlitePool,
    id: Uuid,
    action: QueueAction,
) -> Result<ValidationQueueItem, QueueError> {
    let target = QueueStatus::Pending
        .apply(action)
        .ok_or(QueueError::InvalidTransition {
            id,
            current: QueueStatus::Pending,
            action,
        })?;
    let reviewed_at = format_timestamp(&Utc::now());
    let id_text = id.to_string();
    let (reviewed_at, id_text) = (&reviewed_at, &id_text);

    let affected = retry_on_lock("queue transition", DEFAULT_MAX_LOCK_WAIT_MS, || async move {
        let result = sqlx::query(
            "UPDATE validation_queue SET status = ?, reviewed_at = ? WHERE id = ? AND status = ?",
        )
        .bind(target.as_str())
        .bind(reviewed_at)
        .bind(id_text)
        .bind(QueueStatus::Pending.as_str())
        .execute(pool)
        .await?;
        Ok::<u64, Error>(result.rows_affected())
    })
    .await?;

    if affected == 0 {
        return match load_item(pool, id).await? {
            None => Err(QueueError::NotFound(id)),
            Some(item) if item.status.is_terminal() => Err(QueueError::InvalidTransition {
                id,
                current: item.status,
                action,
            }),
            Some(item) => Err(QueueError::Store(Error::Internal(format!(
                "queue item {} still {} after a rejected update",
                id, item.status
            )))),
        };
    }

    info!(id = %id, action = %action, status = %target, "Queue item reviewed");
    get_item(pool, id).await
}

/// Approved items in creation order, optionally for one city
pub async fn approved_for_import(
    pool: &SqlitePool,
    city: Option<&str>,
) -> Result<Vec<ValidationQueueItem>, QueueError> {
    let filter = QueueFilter {
        status: Some(QueueStatus::Approved),
        city: city.map(str::to_string),
        min_confidence: None,
    };
    list_items(pool, &filter).await
}

fn item_from_row(row: &SqliteRow) -> Result<ValidationQueueItem, QueueError> {
    let id_text: String = row.get("id");
    let status_text: String = row.get("status");
    let candidate_json: String = row.get("candidate");
    let created_text: String = row.get("created_at");
    let reviewed_text: Option<String> = row.get("reviewed_at");

    let id = Uuid::parse_str(&id_text)
        .map_err(|e| Error::Internal(format!("Invalid queue item id {}: {}", id_text, e)))?;
    let status = status_text.parse::<QueueStatus>().map_err(Error::Internal)?;
    let candidate: CandidatePlace = serde_json::from_str(&candidate_json)
        .map_err(|e| Error::Internal(format!("Invalid candidate JSON for {}: {}", id, e)))?;

    Ok(ValidationQueueItem {
        id,
        city: row.get("city_slug"),
        status,
        candidate,
        created_at: parse_timestamp(&created_text)?,
        reviewed_at: reviewed_text.as_deref().map(parse_timestamp).transpose()?,
    })
}

/// Fixed-width UTC timestamps so text order matches time order
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, QueueError> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| QueueError::Store(Error::Internal(format!("Invalid timestamp {}: {}", text, e))))
}
