//! Data models for the discovery and import pipeline

pub mod candidate;
pub mod establishment;
pub mod import_summary;
pub mod queue_item;

pub use candidate::{
    CandidatePlace, ImportRecord, PlaceExtras, DEFAULT_CONFIDENCE, DEFAULT_PRICE_LEVEL,
    SOURCE_BATCH_IMPORT, SOURCE_LLM_RESEARCH,
};
pub use establishment::{EstablishmentRow, EstablishmentStatus, DEFAULT_TIER};
pub use import_summary::{
    BatchFailure, ImportOptions, ImportSummary, DEFAULT_BATCH_SIZE, DRY_RUN_SAMPLE_SIZE,
    MAX_BATCH_SIZE,
};
pub use queue_item::{QueueAction, QueueCounts, QueueFilter, QueueStatus, ValidationQueueItem};
