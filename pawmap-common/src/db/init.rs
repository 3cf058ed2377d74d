//! Database initialization
//!
//! Opens (or creates) the SQLite store and creates the canonical tables.
//! All statements are `CREATE ... IF NOT EXISTS`, so initialization is idempotent.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every table used by the pipeline
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_cities_table(pool).await?;
    create_categories_table(pool).await?;
    create_establishments_table(pool).await?;
    create_validation_queue_table(pool).await?;

    info!("Database schema ready (settings, cities, categories, establishments, validation_queue)");
    Ok(())
}

/// Create the settings table
///
/// Stores runtime key-value settings (e.g. the provider API key set by an operator).
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_cities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            country TEXT NOT NULL DEFAULT '',
            latitude REAL,
            longitude REAL,
            language TEXT NOT NULL DEFAULT 'en',
            dog_regulations TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_categories_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the establishments table
///
/// `(city_id, slug)` is the upsert key. `status`, `tier`, `is_verified` and
/// `is_featured` belong to downstream business logic and are only set on insert.
async fn create_establishments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS establishments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            city_id INTEGER NOT NULL REFERENCES cities(id),
            category_id INTEGER NOT NULL REFERENCES categories(id),
            slug TEXT NOT NULL,
            name TEXT NOT NULL,
            name_local TEXT,
            address TEXT NOT NULL,
            neighborhood TEXT,
            phone TEXT,
            website TEXT,
            description TEXT NOT NULL DEFAULT '',
            description_local TEXT,
            dog_features TEXT NOT NULL DEFAULT '{}',
            price_level INTEGER NOT NULL DEFAULT 2 CHECK (price_level BETWEEN 1 AND 4),
            google_place_id TEXT,
            google_maps_url TEXT,
            photo_refs TEXT NOT NULL DEFAULT '[]',
            opening_hours TEXT NOT NULL DEFAULT '[]',
            enriched INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            tier TEXT NOT NULL DEFAULT 'free',
            is_verified INTEGER NOT NULL DEFAULT 0,
            is_featured INTEGER NOT NULL DEFAULT 0,
            source TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (city_id, slug)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_establishments_category ON establishments(category_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the validation queue table
///
/// The candidate payload is stored as JSON text; status is one of
/// `pending`, `approved`, `rejected`. `name_key` is the slugified candidate
/// name, used to spot candidates already pending for a city.
async fn create_validation_queue_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS validation_queue (
            id TEXT PRIMARY KEY,
            city_slug TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected')),
            name TEXT NOT NULL,
            name_key TEXT NOT NULL DEFAULT '',
            confidence INTEGER NOT NULL DEFAULT 50,
            candidate TEXT NOT NULL,
            created_at TEXT NOT NULL,
            reviewed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_validation_queue_status_city ON validation_queue(status, city_slug)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
