//! Canonical establishment store
//!
//! The import pipeline needs four things from the store: city ids, category
//! ids, the slugs a city already holds and a batch upsert.
//! [`EstablishmentStore`] names exactly that; [`SqliteEstablishmentStore`] is
//! the production implementation.

use async_trait::async_trait;
use pawmap_common::db::{category_ids, city_ids};
use pawmap_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use crate::models::{EstablishmentRow, EstablishmentStatus};
use crate::normalize::StoredSlug;

/// Rows created vs. refreshed by one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
}

/// Store operations used by the import pipeline
#[async_trait]
pub trait EstablishmentStore: Send + Sync {
    /// City slug → id
    async fn city_ids(&self) -> Result<HashMap<String, i64>>;

    /// Category slug → id
    async fn category_ids(&self) -> Result<HashMap<String, i64>>;

    /// Slugs stored for one city with the name and address holding each
    async fn stored_slugs(&self, city_id: i64) -> Result<Vec<StoredSlug>>;

    /// Upsert `rows` keyed on `(city_id, slug)` as one atomic unit
    async fn upsert_batch(&self, rows: &[EstablishmentRow]) -> Result<UpsertOutcome>;
}

/// SQLite-backed store
#[derive(Debug, Clone)]
pub struct SqliteEstablishmentStore {
    pool: SqlitePool,
}

impl SqliteEstablishmentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl EstablishmentStore for SqliteEstablishmentStore {
    async fn city_ids(&self) -> Result<HashMap<String, i64>> {
        city_ids(&self.pool).await
    }

    async fn category_ids(&self) -> Result<HashMap<String, i64>> {
        category_ids(&self.pool).await
    }

    async fn stored_slugs(&self, city_id: i64) -> Result<Vec<StoredSlug>> {
        let rows = sqlx::query("SELECT slug, name, address FROM establishments WHERE city_id = ? ORDER BY id")
            .bind(city_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| StoredSlug {
                slug: row.get("slug"),
                name: row.get("name"),
                address: row.get("address"),
            })
            .collect())
    }

    async fn upsert_batch(&self, rows: &[EstablishmentRow]) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = UpsertOutcome::default();

        for row in rows {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT id FROM establishments WHERE city_id = ? AND slug = ?")
                    .bind(row.city_id)
                    .bind(&row.slug)
                    .fetch_optional(&mut *tx)
                    .await?;

            let dog_features = encode_json(&row.dog_features)?;
            let photo_refs = encode_json(&row.photo_refs)?;
            let opening_hours = encode_json(&row.opening_hours)?;

            sqlx::query(
                r#"
                INSERT INTO establishments (
                    city_id, category_id, slug, name, name_local, address, neighborhood,
                    phone, website, description, description_local, dog_features, price_level,
                    google_place_id, google_maps_url, photo_refs, opening_hours, enriched,
                    status, tier, is_verified, is_featured, source
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(city_id, slug) DO UPDATE SET
                    category_id = excluded.category_id,
                    name = excluded.name,
                    name_local = excluded.name_local,
                    address = excluded.address,
                    neighborhood = excluded.neighborhood,
                    phone = excluded.phone,
                    website = excluded.website,
                    description = excluded.description,
                    description_local = excluded.description_local,
                    dog_features = excluded.dog_features,
                    price_level = excluded.price_level,
                    google_place_id = excluded.google_place_id,
                    google_maps_url = excluded.google_maps_url,
                    photo_refs = excluded.photo_refs,
                    opening_hours = excluded.opening_hours,
                    enriched = excluded.enriched,
                    source = excluded.source,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(row.city_id)
            .bind(row.category_id)
            .bind(&row.slug)
            .bind(&row.name)
            .bind(&row.name_local)
            .bind(&row.address)
            .bind(&row.neighborhood)
            .bind(&row.phone)
            .bind(&row.website)
            .bind(&row.description)
            .bind(&row.description_local)
            .bind(dog_features)
            .bind(row.price_level)
            .bind(&row.google_place_id)
            .bind(&row.google_maps_url)
            .bind(photo_refs)
            .bind(opening_hours)
            .bind(row.enriched)
            .bind(row.status.as_str())
            .bind(&row.tier)
            .bind(row.is_verified)
            .bind(row.is_featured)
            .bind(&row.source)
            .execute(&mut *tx)
            .await?;

            if exists.is_some() {
                outcome.updated += 1;
            } else {
                outcome.inserted += 1;
            }
        }

        tx.commit().await?;

        debug!(
            rows = rows.len(),
            inserted = outcome.inserted,
            updated = outcome.updated,
            "Establishment batch committed"
        );
        Ok(outcome)
    }
}

/// Load one establishment by its upsert key
pub async fn load_establishment(
    pool: &SqlitePool,
    city_id: i64,
    slug: &str,
) -> Result<Option<EstablishmentRow>> {
    let row = sqlx::query(
        r#"
        SELECT city_id, category_id, slug, name, name_local, address, neighborhood, phone,
               website, description, description_local, dog_features, price_level,
               google_place_id, google_maps_url, photo_refs, opening_hours, enriched,
               status, tier, is_verified, is_featured, source
        FROM establishments
        WHERE city_id = ? AND slug = ?
        "#,
    )
    .bind(city_id)
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    row.map(|r| row_to_establishment(&r)).transpose()
}

/// Total establishment rows
pub async fn count_establishments(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM establishments")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn row_to_establishment(row: &SqliteRow) -> Result<EstablishmentRow> {
    let dog_features: String = row.get("dog_features");
    let photo_refs: String = row.get("photo_refs");
    let opening_hours: String = row.get("opening_hours");
    let status: String = row.get("status");

    Ok(EstablishmentRow {
        city_id: row.get("city_id"),
        category_id: row.get("category_id"),
        slug: row.get("slug"),
        name: row.get("name"),
        name_local: row.get("name_local"),
        address: row.get("address"),
        neighborhood: row.get("neighborhood"),
        phone: row.get("phone"),
        website: row.get("website"),
        description: row.get("description"),
        description_local: row.get("description_local"),
        dog_features: decode_json(&dog_features)?,
        price_level: row.get("price_level"),
        google_place_id: row.get("google_place_id"),
        google_maps_url: row.get("google_maps_url"),
        photo_refs: decode_json(&photo_refs)?,
        opening_hours: decode_json(&opening_hours)?,
        enriched: row.get("enriched"),
        status: if status == EstablishmentStatus::Inactive.as_str() {
            EstablishmentStatus::Inactive
        } else {
            EstablishmentStatus::Active
        },
        tier: row.get("tier"),
        is_verified: row.get("is_verified"),
        is_featured: row.get("is_featured"),
        source: row.get("source"),
    })
}

fn encode_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn decode_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}
