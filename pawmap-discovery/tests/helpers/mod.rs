//! Shared test utilities
//!
//! In-memory and file-backed databases seeded with reference data, a
//! scripted research provider and store wrappers that fail on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use pawmap_common::config::CityConfig;
use pawmap_common::db::{create_schema, init_database, seed_categories, seed_cities};
use pawmap_common::{Error, Result};
use pawmap_discovery::db::{EstablishmentStore, SqliteEstablishmentStore, UpsertOutcome};
use pawmap_discovery::discovery::{ProviderError, ProviderResponse, ResearchProvider};
use pawmap_discovery::models::{CandidatePlace, EstablishmentRow, ImportRecord};
use pawmap_discovery::normalize::{StoredSlug, CANONICAL_CATEGORIES};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

pub fn test_cities() -> Vec<CityConfig> {
    ["paris", "lyon", "rome"]
        .into_iter()
        .map(|slug| CityConfig {
            slug: slug.to_string(),
            name: slug.to_string(),
            country: "Testland".to_string(),
            latitude: Some(1.0),
            longitude: Some(2.0),
            language: "en".to_string(),
            dog_regulations: String::new(),
        })
        .collect()
}

/// Single-connection in-memory database with schema and reference data
pub async fn memory_pool() -> SqlitePool {
    memory_pool_with_categories(CANONICAL_CATEGORIES).await
}

pub async fn memory_pool_with_categories(categories: &[(&str, &str)]) -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();
    seed_categories(&pool, categories).await.unwrap();
    seed_cities(&pool, &test_cities()).await.unwrap();
    pool
}

/// File-backed database for tests that need several connections
///
/// Keep the `TempDir` alive for the duration of the test.
pub async fn file_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("pawmap_test.db"))
        .await
        .unwrap();
    seed_categories(&pool, CANONICAL_CATEGORIES).await.unwrap();
    seed_cities(&pool, &test_cities()).await.unwrap();
    (temp_dir, pool)
}

pub fn place(name: &str, category: &str) -> CandidatePlace {
    CandidatePlace {
        name: name.to_string(),
        localized_name: None,
        category: category.to_string(),
        address: format!("{} Street 1", name),
        neighborhood: None,
        phone: None,
        website: None,
        description: format!("{} welcomes dogs", name),
        localized_description: None,
        dog_features: [("water_bowls".to_string(), true)].into_iter().collect(),
        price_level: 2,
        confidence: 80,
        reasoning: String::new(),
        source: "batch-import".to_string(),
    }
}

pub fn record(city: &str, name: &str, category: &str) -> ImportRecord {
    ImportRecord::new(city, place(name, category))
}

pub fn record_in(city: &str, name: &str, category: &str, neighborhood: &str) -> ImportRecord {
    let mut record = record(city, name, category);
    record.place.neighborhood = Some(neighborhood.to_string());
    record
}

/// Provider that replays scripted responses in order
pub struct ScriptedProvider {
    script: Mutex<VecDeque<std::result::Result<ProviderResponse, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedProvider {
    pub fn new(script: Vec<std::result::Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Every call sleeps for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

pub fn ok_text(text: &str, tokens_used: u64) -> std::result::Result<ProviderResponse, ProviderError> {
    Ok(ProviderResponse {
        text: text.to_string(),
        tokens_used,
    })
}

#[async_trait]
impl ResearchProvider for ScriptedProvider {
    async fn research(&self, prompt: &str) -> std::result::Result<ProviderResponse, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("script exhausted".to_string())))
    }
}

/// Store that fails (or stalls) on selected batch calls and delegates the rest
pub struct FlakyStore {
    inner: SqliteEstablishmentStore,
    failing_calls: HashSet<usize>,
    stall: Option<Duration>,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn failing(pool: SqlitePool, failing_calls: &[usize]) -> Self {
        Self {
            inner: SqliteEstablishmentStore::new(pool),
            failing_calls: failing_calls.iter().copied().collect(),
            stall: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn stalling(pool: SqlitePool, stalling_calls: &[usize], stall: Duration) -> Self {
        Self {
            stall: Some(stall),
            ..Self::failing(pool, stalling_calls)
        }
    }

    pub fn upsert_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EstablishmentStore for FlakyStore {
    async fn city_ids(&self) -> Result<HashMap<String, i64>> {
        self.inner.city_ids().await
    }

    async fn category_ids(&self) -> Result<HashMap<String, i64>> {
        self.inner.category_ids().await
    }

    async fn stored_slugs(&self, city_id: i64) -> Result<Vec<StoredSlug>> {
        self.inner.stored_slugs(city_id).await
    }

    async fn upsert_batch(&self, rows: &[EstablishmentRow]) -> Result<UpsertOutcome> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_calls.contains(&call) {
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            } else {
                return Err(Error::Internal(format!("injected failure on batch {}", call)));
            }
        }
        self.inner.upsert_batch(rows).await
    }
}
