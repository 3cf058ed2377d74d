//! City and category reference data
//!
//! Cities and categories are owned by the canonical store. The pipeline only
//! reads them (slug → id lookups, city context for prompts) and seeds them from
//! configuration at startup.

use crate::config::CityConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

/// City row as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRecord {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub language: String,
    pub dog_regulations: String,
}

/// Insert or refresh reference cities
///
/// Existing rows keep their id; descriptive columns are refreshed.
pub async fn seed_cities(pool: &SqlitePool, cities: &[CityConfig]) -> Result<usize> {
    for city in cities {
        sqlx::query(
            r#"
            INSERT INTO cities (slug, name, country, latitude, longitude, language, dog_regulations)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                name = excluded.name,
                country = excluded.country,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                language = excluded.language,
                dog_regulations = excluded.dog_regulations
            "#,
        )
        .bind(&city.slug)
        .bind(&city.name)
        .bind(&city.country)
        .bind(city.latitude)
        .bind(city.longitude)
        .bind(&city.language)
        .bind(&city.dog_regulations)
        .execute(pool)
        .await?;
    }

    debug!(count = cities.len(), "Reference cities seeded");
    Ok(cities.len())
}

/// Insert missing categories as `(slug, display name)` pairs
pub async fn seed_categories(pool: &SqlitePool, categories: &[(&str, &str)]) -> Result<usize> {
    let mut inserted = 0;
    for &(slug, name) in categories {
        let result = sqlx::query("INSERT OR IGNORE INTO categories (slug, name) VALUES (?, ?)")
            .bind(slug)
            .bind(name)
            .execute(pool)
            .await?;
        inserted += result.rows_affected() as usize;
    }

    debug!(inserted, "Reference categories seeded");
    Ok(inserted)
}

/// Load every city ordered by slug
pub async fn load_cities(pool: &SqlitePool) -> Result<Vec<CityRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, slug, name, country, latitude, longitude, language, dog_regulations
        FROM cities
        ORDER BY slug
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| CityRecord {
            id: row.get("id"),
            slug: row.get("slug"),
            name: row.get("name"),
            country: row.get("country"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            language: row.get("language"),
            dog_regulations: row.get("dog_regulations"),
        })
        .collect())
}

/// City slug → id
pub async fn city_ids(pool: &SqlitePool) -> Result<HashMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as("SELECT slug, id FROM cities")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Category slug → id
pub async fn category_ids(pool: &SqlitePool) -> Result<HashMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as("SELECT slug, id FROM categories")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}
