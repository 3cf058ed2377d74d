//! Candidate establishments produced by discovery or read from batch files

use serde::{Deserialize, Serialize};

use crate::normalize::DogFeatures;

/// Provenance tag for discovery output
pub const SOURCE_LLM_RESEARCH: &str = "llm-research";

/// Provenance tag for batch files that carry none
pub const SOURCE_BATCH_IMPORT: &str = "batch-import";

/// Default price level when none is given
pub const DEFAULT_PRICE_LEVEL: i64 = 2;

/// Default confidence when the model reports none
pub const DEFAULT_CONFIDENCE: i64 = 50;

/// A proposed establishment, not yet in the canonical store
///
/// Never constructed with an empty `name` or `address`; the parser drops
/// such elements instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePlace {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localized_name: Option<String>,
    /// Raw label, resolved to a canonical category at import time
    pub category: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localized_description: Option<String>,
    #[serde(default)]
    pub dog_features: DogFeatures,
    /// 1..=4
    pub price_level: i64,
    /// 0..=100, self-reported by the provider
    pub confidence: i64,
    #[serde(default)]
    pub reasoning: String,
    pub source: String,
}

/// Batch-file-only fields carried through to the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceExtras {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_place_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_maps_url: Option<String>,
    #[serde(default)]
    pub photo_refs: Vec<String>,
    #[serde(default)]
    pub opening_hours: Vec<String>,
    #[serde(default)]
    pub enriched: bool,
}

/// One record handed to the import pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    /// City slug, resolved to `city_id` during import
    pub city_slug: String,
    pub place: CandidatePlace,
    pub extras: PlaceExtras,
}

impl ImportRecord {
    pub fn new(city_slug: impl Into<String>, place: CandidatePlace) -> Self {
        Self {
            city_slug: city_slug.into(),
            place,
            extras: PlaceExtras::default(),
        }
    }
}
