//! Import run options and summary

use serde::Serialize;
use std::collections::BTreeSet;

use crate::models::EstablishmentRow;

/// Default rows per upsert batch
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Upper bound on rows per upsert batch
pub const MAX_BATCH_SIZE: usize = 200;

/// Rows included in a dry-run sample
pub const DRY_RUN_SAMPLE_SIZE: usize = 5;

/// Options for one import run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Resolve and normalize everything but write nothing
    pub dry_run: bool,
    /// Requested batch size, clamped to `1..=MAX_BATCH_SIZE`
    pub batch_size: usize,
}

impl ImportOptions {
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// A batch whose upsert failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    /// Zero-based batch index in run order
    pub batch_index: usize,
    pub rows: usize,
    pub message: String,
}

/// Outcome of one import run
///
/// Per-record and per-batch problems are aggregated here rather than
/// returned as errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    /// Records handed to the run
    pub total: usize,
    /// Rows newly created
    pub inserted: usize,
    /// Rows that already existed for `(city_id, slug)`
    pub updated: usize,
    /// Records skipped for a missing city or category id
    pub skipped: usize,
    /// Rows in failed batches, plus records of a city whose stored slugs could not be read
    pub errored: usize,
    /// Raw labels that fell back to the default category or had no store id
    pub unmapped_categories: BTreeSet<String>,
    /// City slugs with no store id
    pub missing_cities: BTreeSet<String>,
    pub batch_failures: Vec<BatchFailure>,
    pub dry_run: bool,
    /// Rows that passed resolution (written, or would be written on dry run)
    pub would_write: usize,
    /// First rows of a dry run
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sample: Vec<EstablishmentRow>,
    /// Run stopped early by the operator
    pub cancelled: bool,
}

impl ImportSummary {
    /// Count input records rejected before the run (no name or address)
    pub fn record_invalid(&mut self, count: usize) {
        self.total += count;
        self.skipped += count;
    }

    /// Fold another run's counts into this one
    pub fn merge(&mut self, other: ImportSummary) {
        self.total += other.total;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.errored += other.errored;
        self.unmapped_categories.extend(other.unmapped_categories);
        self.missing_cities.extend(other.missing_cities);
        self.batch_failures.extend(other.batch_failures);
        self.dry_run |= other.dry_run;
        self.would_write += other.would_write;
        let room = DRY_RUN_SAMPLE_SIZE.saturating_sub(self.sample.len());
        self.sample.extend(other.sample.into_iter().take(room));
        self.cancelled |= other.cancelled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size_is_bounded() {
        let opts = |batch_size| ImportOptions { dry_run: false, batch_size };
        assert_eq!(opts(0).effective_batch_size(), 1);
        assert_eq!(opts(10_000).effective_batch_size(), MAX_BATCH_SIZE);
        assert_eq!(opts(25).effective_batch_size(), 25);
    }

    #[test]
    fn test_merge_accumulates() {
        let mut total = ImportSummary {
            total: 3,
            inserted: 2,
            skipped: 1,
            ..Default::default()
        };
        let mut other = ImportSummary {
            total: 2,
            updated: 1,
            errored: 1,
            cancelled: true,
            ..Default::default()
        };
        other.unmapped_categories.insert("bistro-unknown".to_string());

        total.merge(other);

        assert_eq!(total.total, 5);
        assert_eq!(total.inserted, 2);
        assert_eq!(total.updated, 1);
        assert_eq!(total.errored, 1);
        assert!(total.cancelled);
        assert!(total.unmapped_categories.contains("bistro-unknown"));
    }
}
