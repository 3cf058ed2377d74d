//! Import / seeding pipeline
//!
//! Turns [`ImportRecord`]s (approved queue items or curated batch files) into
//! establishment rows and upserts them in fixed-size batches. Per-record
//! problems are skipped and counted; a failed batch is counted and the run
//! moves on to the next one. Only setup problems (unreadable input, reference
//! lookups failing) surface as [`ImportError`].

pub mod batch_file;

use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::db::queue::{self, QueueError};
use crate::db::EstablishmentStore;
use crate::models::{
    BatchFailure, EstablishmentRow, EstablishmentStatus, ImportOptions, ImportRecord,
    ImportSummary, ValidationQueueItem, DEFAULT_TIER, DRY_RUN_SAMPLE_SIZE,
};
use crate::normalize::{clamp_price_level, CategoryResolver, SlugAllocator, StoredSlug};

pub use batch_file::{collect_batch_paths, load_batch_file, parse_batch_document, LoadedBatch};

/// Default bound on one batch write
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Setup-level import failure; aborts the run before any write
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid batch file {}: {message}", path.display())]
    InvalidFile { path: PathBuf, message: String },

    #[error("Failed to load reference ids: {0}")]
    Lookup(#[source] pawmap_common::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Record that passed city and category resolution
struct Resolved<'a> {
    record: &'a ImportRecord,
    city_id: i64,
    category_id: i64,
}

/// Normalizes records and writes them through an [`EstablishmentStore`]
pub struct ImportPipeline {
    store: Arc<dyn EstablishmentStore>,
    resolver: Arc<CategoryResolver>,
    write_timeout: Duration,
}

impl ImportPipeline {
    pub fn new(store: Arc<dyn EstablishmentStore>, resolver: Arc<CategoryResolver>) -> Self {
        Self {
            store,
            resolver,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Fetch reference ids from the store, then run [`Self::import_batch`]
    pub async fn import_records(
        &self,
        records: &[ImportRecord],
        opts: ImportOptions,
        cancel: &CancellationToken,
    ) -> Result<ImportSummary, ImportError> {
        let city_lookup = self.store.city_ids().await.map_err(ImportError::Lookup)?;
        let category_lookup = self.store.category_ids().await.map_err(ImportError::Lookup)?;

        Ok(self
            .import_batch(records, &city_lookup, &category_lookup, opts, cancel)
            .await)
    }

    /// Resolve, normalize, deduplicate slugs and upsert in batches
    ///
    /// Identical input against identical lookups always produces identical
    /// rows, so re-running an import only refreshes what is already there.
    /// Records matching a stored row by name and address keep its slug even
    /// when the input has grown since that row was written.
    pub async fn import_batch(
        &self,
        records: &[ImportRecord],
        city_lookup: &HashMap<String, i64>,
        category_lookup: &HashMap<String, i64>,
        opts: ImportOptions,
        cancel: &CancellationToken,
    ) -> ImportSummary {
        let mut summary = ImportSummary {
            total: records.len(),
            dry_run: opts.dry_run,
            ..Default::default()
        };

        let resolved = self.resolve(records, city_lookup, category_lookup, &mut summary);
        let (resolved, stored) = self.load_stored_slugs(resolved, &mut summary).await;
        let rows = build_rows(&resolved, &stored);
        summary.would_write = rows.len();

        if !summary.unmapped_categories.is_empty() {
            info!(
                labels = ?summary.unmapped_categories,
                "Category labels without alias; extend [categories.aliases] to map them"
            );
        }

        if opts.dry_run {
            summary.sample = rows.iter().take(DRY_RUN_SAMPLE_SIZE).cloned().collect();
            info!(
                total = summary.total,
                would_write = summary.would_write,
                skipped = summary.skipped,
                "Dry run complete, nothing written"
            );
            return summary;
        }

        let batch_size = opts.effective_batch_size();
        for (batch_index, chunk) in rows.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                warn!(batch_index, "Import cancelled, remaining batches not written");
                summary.cancelled = true;
                break;
            }

            let outcome = tokio::time::timeout(self.write_timeout, self.store.upsert_batch(chunk)).await;
            match outcome {
                Ok(Ok(written)) => {
                    summary.inserted += written.inserted;
                    summary.updated += written.updated;
                }
                Ok(Err(e)) => self.record_failure(&mut summary, batch_index, chunk.len(), e.to_string()),
                Err(_) => self.record_failure(
                    &mut summary,
                    batch_index,
                    chunk.len(),
                    format!("write timed out after {:?}", self.write_timeout),
                ),
            }
        }

        info!(
            total = summary.total,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            errored = summary.errored,
            cancelled = summary.cancelled,
            "Import run finished"
        );
        summary
    }

    fn resolve<'a>(
        &self,
        records: &'a [ImportRecord],
        city_lookup: &HashMap<String, i64>,
        category_lookup: &HashMap<String, i64>,
        summary: &mut ImportSummary,
    ) -> Vec<Resolved<'a>> {
        let mut resolved = Vec::with_capacity(records.len());

        for record in records {
            let Some(&city_id) = city_lookup.get(&record.city_slug) else {
                warn!(city = %record.city_slug, name = %record.place.name, "Unknown city, record skipped");
                summary.skipped += 1;
                summary.missing_cities.insert(record.city_slug.clone());
                continue;
            };

            let label = record.place.category.trim();
            let resolution = self.resolver.resolve_label(label);
            if !resolution.mapped {
                summary.unmapped_categories.insert(label.to_string());
            }

            let Some(&category_id) = category_lookup.get(resolution.slug) else {
                warn!(
                    label = %label,
                    category = resolution.slug,
                    "Category not seeded in store, record skipped"
                );
                summary.skipped += 1;
                summary.unmapped_categories.insert(label.to_string());
                continue;
            };

            resolved.push(Resolved {
                record,
                city_id,
                category_id,
            });
        }

        resolved
    }

    /// Stored slugs for every city in `resolved`, one store query per city
    ///
    /// Records of a city whose stored slugs cannot be read are counted as
    /// errored and dropped; writing them blind could duplicate stored places.
    async fn load_stored_slugs<'a>(
        &self,
        resolved: Vec<Resolved<'a>>,
        summary: &mut ImportSummary,
    ) -> (Vec<Resolved<'a>>, HashMap<String, Vec<StoredSlug>>) {
        let cities: BTreeMap<&str, i64> = resolved
            .iter()
            .map(|r| (r.record.city_slug.as_str(), r.city_id))
            .collect();

        let mut stored = HashMap::with_capacity(cities.len());
        for (city, city_id) in cities {
            match self.store.stored_slugs(city_id).await {
                Ok(rows) => {
                    stored.insert(city.to_string(), rows);
                }
                Err(e) => warn!(city, error = %e, "Failed to read stored slugs, city skipped"),
            }
        }

        let before = resolved.len();
        let kept: Vec<Resolved<'a>> = resolved
            .into_iter()
            .filter(|r| stored.contains_key(&r.record.city_slug))
            .collect();
        summary.errored += before - kept.len();

        (kept, stored)
    }

    fn record_failure(&self, summary: &mut ImportSummary, batch_index: usize, rows: usize, message: String) {
        warn!(batch_index, rows, error = %message, "Batch write failed, continuing");
        summary.errored += rows;
        summary.batch_failures.push(BatchFailure {
            batch_index,
            rows,
            message,
        });
    }
}

fn build_rows(
    resolved: &[Resolved<'_>],
    stored: &HashMap<String, Vec<StoredSlug>>,
) -> Vec<EstablishmentRow> {
    let mut slugs = SlugAllocator::plan(resolved.iter().map(|r| {
        (
            r.record.city_slug.as_str(),
            r.record.place.name.as_str(),
            r.record.place.address.as_str(),
        )
    }));
    for (city, rows) in stored {
        slugs.remember_stored(city, rows);
    }

    resolved
        .iter()
        .map(|r| {
            let place = &r.record.place;
            let extras = &r.record.extras;
            let slug = slugs.assign(
                &r.record.city_slug,
                &place.name,
                &place.address,
                place.neighborhood.as_deref(),
            );

            EstablishmentRow {
                city_id: r.city_id,
                category_id: r.category_id,
                slug,
                name: place.name.clone(),
                name_local: place.localized_name.clone(),
                address: place.address.clone(),
                neighborhood: place.neighborhood.clone(),
                phone: place.phone.clone(),
                website: place.website.clone(),
                description: place.description.clone(),
                description_local: place.localized_description.clone(),
                dog_features: place.dog_features.clone(),
                price_level: clamp_price_level(place.price_level),
                google_place_id: extras.google_place_id.clone(),
                google_maps_url: extras.google_maps_url.clone(),
                photo_refs: extras.photo_refs.clone(),
                opening_hours: extras.opening_hours.clone(),
                enriched: extras.enriched,
                status: EstablishmentStatus::Active,
                tier: DEFAULT_TIER.to_string(),
                is_verified: false,
                is_featured: false,
                source: place.source.clone(),
            }
        })
        .collect()
}

/// Import records for approved queue items
pub fn records_from_queue(items: &[ValidationQueueItem]) -> Vec<ImportRecord> {
    items
        .iter()
        .map(|item| ImportRecord::new(item.city.clone(), item.candidate.clone()))
        .collect()
}

/// Every approved queue item (optionally for one city) as import records
///
/// All approved items are returned on every call, in creation order. Places
/// written by an earlier run keep their slugs, so a repeated run only
/// refreshes those rows and inserts the newly approved ones.
pub async fn load_approved_records(
    pool: &SqlitePool,
    city: Option<&str>,
) -> Result<Vec<ImportRecord>, ImportError> {
    let items = queue::approved_for_import(pool, city).await?;
    Ok(records_from_queue(&items))
}
