//! Database access for the discovery pipeline
//!
//! Schema creation and reference data live in `pawmap_common::db`; this module
//! adds the validation queue and the establishment store.

pub mod establishments;
pub mod queue;

pub use establishments::{
    count_establishments, load_establishment, EstablishmentStore, SqliteEstablishmentStore,
    UpsertOutcome,
};
pub use queue::{EnqueueOutcome, QueueError};
