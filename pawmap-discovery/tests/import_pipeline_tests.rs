//! Import pipeline integration tests
//!
//! Run against real SQLite stores (in-memory unless several connections are
//! needed) with store wrappers injecting batch failures.

mod helpers;

use helpers::{memory_pool, memory_pool_with_categories, place, record, record_in, FlakyStore};
use pawmap_common::db::{category_ids, city_ids};
use pawmap_discovery::db::queue::{enqueue_candidates, list_items, transition};
use pawmap_discovery::db::{count_establishments, load_establishment, SqliteEstablishmentStore};
use pawmap_discovery::import::{load_approved_records, ImportPipeline};
use pawmap_discovery::models::{ImportOptions, QueueAction, QueueFilter, QueueStatus};
use pawmap_discovery::normalize::CategoryResolver;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn pipeline(pool: &SqlitePool) -> ImportPipeline {
    ImportPipeline::new(
        Arc::new(SqliteEstablishmentStore::new(pool.clone())),
        Arc::new(CategoryResolver::new()),
    )
}

fn opts(batch_size: usize) -> ImportOptions {
    ImportOptions {
        dry_run: false,
        batch_size,
    }
}

async fn city_id(pool: &SqlitePool, slug: &str) -> i64 {
    city_ids(pool).await.unwrap()[slug]
}

#[tokio::test]
async fn test_reimport_updates_instead_of_duplicating() {
    let pool = memory_pool().await;
    let records = vec![
        record("paris", "Le Chien Heureux", "restaurant"),
        record("paris", "Bark Café", "cafe"),
        record("lyon", "Parc de la Tête d'Or", "park"),
    ];
    let cancel = CancellationToken::new();

    let first = pipeline(&pool)
        .import_records(&records, opts(50), &cancel)
        .await
        .unwrap();
    assert_eq!(first.inserted, 3);
    assert_eq!(first.updated, 0);

    let second = pipeline(&pool)
        .import_records(&records, opts(50), &cancel)
        .await
        .unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 3);
    assert_eq!(count_establishments(&pool).await.unwrap(), 3);
}

#[tokio::test]
async fn test_category_resolution_and_unmapped_labels() {
    let pool = memory_pool().await;
    let records = vec![
        record("paris", "Bois de Boulogne", "Dog Park"),
        record("paris", "Chez Rex", "bistro-unknown"),
    ];

    let summary = pipeline(&pool)
        .import_records(&records, opts(50), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.skipped, 0);
    assert!(summary.unmapped_categories.contains("bistro-unknown"));
    assert!(!summary.unmapped_categories.contains("Dog Park"));

    let categories = category_ids(&pool).await.unwrap();
    let paris = city_id(&pool, "paris").await;

    let park = load_establishment(&pool, paris, "bois-de-boulogne").await.unwrap().unwrap();
    assert_eq!(park.category_id, categories["parks"]);

    let bistro = load_establishment(&pool, paris, "chez-rex").await.unwrap().unwrap();
    assert_eq!(bistro.category_id, categories["activities"]);
}

#[tokio::test]
async fn test_duplicate_names_get_neighborhood_slugs() {
    let pool = memory_pool().await;
    let records = vec![
        record_in("paris", "Café du Soleil", "cafe", "Old Town"),
        record_in("paris", "Café du Soleil", "cafe", "Riverside"),
    ];

    let summary = pipeline(&pool)
        .import_records(&records, opts(50), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.inserted, 2);

    let paris = city_id(&pool, "paris").await;
    for slug in ["cafe-du-soleil-old-town", "cafe-du-soleil-riverside"] {
        assert!(
            load_establishment(&pool, paris, slug).await.unwrap().is_some(),
            "missing {}",
            slug
        );
    }
}

#[tokio::test]
async fn test_same_name_in_two_cities_keeps_plain_slug() {
    let pool = memory_pool().await;
    let records = vec![record("paris", "Dog Café", "cafe"), record("lyon", "Dog Café", "cafe")];

    pipeline(&pool)
        .import_records(&records, opts(50), &CancellationToken::new())
        .await
        .unwrap();

    for city in ["paris", "lyon"] {
        let id = city_id(&pool, city).await;
        assert!(load_establishment(&pool, id, "dog-cafe").await.unwrap().is_some());
    }
}

#[tokio::test]
async fn test_price_levels_are_clamped() {
    let pool = memory_pool().await;
    let mut expensive = record("rome", "Caro", "restaurant");
    expensive.place.price_level = 7;
    let mut free = record("rome", "Gratis", "restaurant");
    free.place.price_level = 0;
    let default = record("rome", "Medio", "restaurant");

    pipeline(&pool)
        .import_records(&[expensive, free, default], opts(50), &CancellationToken::new())
        .await
        .unwrap();

    let rome = city_id(&pool, "rome").await;
    for (slug, expected) in [("caro", 4), ("gratis", 1), ("medio", 2)] {
        let row = load_establishment(&pool, rome, slug).await.unwrap().unwrap();
        assert_eq!(row.price_level, expected, "{}", slug);
    }
}

#[tokio::test]
async fn test_unknown_city_is_skipped_and_run_continues() {
    let pool = memory_pool().await;
    let records = vec![
        record("atlantis", "Sunken Bar", "bar"),
        record("paris", "Le Chien", "restaurant"),
    ];

    let summary = pipeline(&pool)
        .import_records(&records, opts(50), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.inserted, 1);
    assert!(summary.missing_cities.contains("atlantis"));
}

#[tokio::test]
async fn test_unseeded_category_is_skipped_with_label_recorded() {
    let pool = memory_pool_with_categories(&[("cafes", "Cafes"), ("activities", "Activities")]).await;
    let records = vec![
        record("paris", "Plage de Paris", "plage"),
        record("paris", "Bark Café", "cafe"),
    ];

    let summary = pipeline(&pool)
        .import_records(&records, opts(50), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.inserted, 1);
    assert!(summary.unmapped_categories.contains("plage"));
}

#[tokio::test]
async fn test_failed_batch_is_isolated() {
    let pool = memory_pool().await;
    let records: Vec<_> = (1..=5)
        .map(|i| record("paris", &format!("Place {}", i), "cafe"))
        .collect();
    let store = Arc::new(FlakyStore::failing(pool.clone(), &[1]));
    let pipeline = ImportPipeline::new(store.clone(), Arc::new(CategoryResolver::new()));

    let summary = pipeline
        .import_records(&records, opts(2), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(store.upsert_calls(), 3);
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.errored, 2);
    assert_eq!(summary.batch_failures.len(), 1);
    assert_eq!(summary.batch_failures[0].batch_index, 1);
    assert_eq!(summary.batch_failures[0].rows, 2);
    assert_eq!(count_establishments(&pool).await.unwrap(), 3);
}

#[tokio::test]
async fn test_stalled_batch_times_out_and_run_continues() {
    let pool = memory_pool().await;
    let records: Vec<_> = (1..=4)
        .map(|i| record("rome", &format!("Trattoria {}", i), "restaurant"))
        .collect();
    let store = Arc::new(FlakyStore::stalling(pool.clone(), &[0], Duration::from_secs(5)));
    let pipeline = ImportPipeline::new(store, Arc::new(CategoryResolver::new()))
        .with_write_timeout(Duration::from_millis(50));

    let summary = pipeline
        .import_records(&records, opts(2), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.errored, 2);
    assert_eq!(summary.inserted, 2);
    assert!(summary.batch_failures[0].message.contains("timed out"));
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let pool = memory_pool().await;
    let records: Vec<_> = (1..=8)
        .map(|i| record("paris", &format!("Spot {}", i), "park"))
        .collect();

    let summary = pipeline(&pool)
        .import_records(
            &records,
            ImportOptions {
                dry_run: true,
                batch_size: 3,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.would_write, 8);
    assert_eq!(summary.sample.len(), 5);
    assert_eq!(summary.sample[0].slug, "spot-1");
    assert_eq!(summary.inserted, 0);
    assert_eq!(count_establishments(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancelled_run_stops_before_next_batch() {
    let pool = memory_pool().await;
    let records: Vec<_> = (1..=4)
        .map(|i| record("paris", &format!("Spot {}", i), "park"))
        .collect();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = pipeline(&pool)
        .import_records(&records, opts(2), &cancel)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.inserted, 0);
    assert_eq!(count_establishments(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_zero_batch_size_is_clamped_to_one() {
    let pool = memory_pool().await;
    let records: Vec<_> = (1..=3)
        .map(|i| record("lyon", &format!("Spot {}", i), "park"))
        .collect();
    let store = Arc::new(FlakyStore::failing(pool.clone(), &[]));
    let pipeline = ImportPipeline::new(store.clone(), Arc::new(CategoryResolver::new()));

    let summary = pipeline
        .import_records(&records, opts(0), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.inserted, 3);
    assert_eq!(store.upsert_calls(), 3);
}

#[tokio::test]
async fn test_approved_queue_items_import_idempotently() {
    let pool = memory_pool().await;
    let mut candidates = vec![place("Bark Bar", "bar"), place("Paws Park", "dog park")];
    candidates.push(place("Rejected Place", "cafe"));
    for candidate in &mut candidates {
        candidate.source = "llm-research".to_string();
    }
    enqueue_candidates(&pool, "paris", &candidates).await.unwrap();

    let items = list_items(&pool, &QueueFilter::default()).await.unwrap();
    transition(&pool, items[0].id, QueueAction::Approve).await.unwrap();
    transition(&pool, items[1].id, QueueAction::Approve).await.unwrap();
    transition(&pool, items[2].id, QueueAction::Reject).await.unwrap();

    let records = load_approved_records(&pool, Some("paris")).await.unwrap();
    assert_eq!(records.len(), 2);

    let first = pipeline(&pool)
        .import_records(&records, opts(50), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.inserted, 2);

    let records = load_approved_records(&pool, None).await.unwrap();
    let second = pipeline(&pool)
        .import_records(&records, opts(50), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 2);

    let paris = city_id(&pool, "paris").await;
    let row = load_establishment(&pool, paris, "bark-bar").await.unwrap().unwrap();
    assert_eq!(row.source, "llm-research");
}

#[tokio::test]
async fn test_growing_approved_set_keeps_existing_slugs() {
    let pool = memory_pool().await;
    let cancel = CancellationToken::new();

    let mut riverside = place("Café X", "cafe");
    riverside.address = "3 Quai des Berges".to_string();
    riverside.neighborhood = Some("Riverside".to_string());
    enqueue_candidates(&pool, "paris", &[riverside]).await.unwrap();
    let items = list_items(&pool, &QueueFilter::default()).await.unwrap();
    transition(&pool, items[0].id, QueueAction::Approve).await.unwrap();

    let records = load_approved_records(&pool, None).await.unwrap();
    let first = pipeline(&pool).import_records(&records, opts(50), &cancel).await.unwrap();
    assert_eq!(first.inserted, 1);

    // A namesake in another neighborhood is approved later
    let mut old_town = place("Café X", "cafe");
    old_town.address = "12 Rue Ancienne".to_string();
    old_town.neighborhood = Some("Old Town".to_string());
    enqueue_candidates(&pool, "paris", &[old_town]).await.unwrap();
    let pending = list_items(
        &pool,
        &QueueFilter {
            status: Some(QueueStatus::Pending),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    transition(&pool, pending[0].id, QueueAction::Approve).await.unwrap();

    let records = load_approved_records(&pool, None).await.unwrap();
    assert_eq!(records.len(), 2);
    let second = pipeline(&pool).import_records(&records, opts(50), &cancel).await.unwrap();
    assert_eq!(second.inserted, 1);
    assert_eq!(second.updated, 1);
    assert_eq!(count_establishments(&pool).await.unwrap(), 2);

    let paris = city_id(&pool, "paris").await;
    let kept = load_establishment(&pool, paris, "cafe-x").await.unwrap().unwrap();
    assert_eq!(kept.address, "3 Quai des Berges");
    let added = load_establishment(&pool, paris, "cafe-x-old-town")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(added.address, "12 Rue Ancienne");

    let third = pipeline(&pool).import_records(&records, opts(50), &cancel).await.unwrap();
    assert_eq!(third.inserted, 0);
    assert_eq!(third.updated, 2);
}
