//! Canonical establishment row as written by the import pipeline

use serde::{Deserialize, Serialize};

use crate::normalize::DogFeatures;

/// Listing status owned by downstream business logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EstablishmentStatus {
    Active,
    Inactive,
}

impl EstablishmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }
}

/// Default tier for imported rows
pub const DEFAULT_TIER: &str = "free";

/// One row of the `establishments` table
///
/// `status`, `tier`, `is_verified` and `is_featured` are only written on
/// insert; an upsert of an existing `(city_id, slug)` leaves them alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstablishmentRow {
    pub city_id: i64,
    pub category_id: i64,
    pub slug: String,
    pub name: String,
    pub name_local: Option<String>,
    pub address: String,
    pub neighborhood: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub description: String,
    pub description_local: Option<String>,
    pub dog_features: DogFeatures,
    pub price_level: i64,
    pub google_place_id: Option<String>,
    pub google_maps_url: Option<String>,
    pub photo_refs: Vec<String>,
    pub opening_hours: Vec<String>,
    pub enriched: bool,
    pub status: EstablishmentStatus,
    pub tier: String,
    pub is_verified: bool,
    pub is_featured: bool,
    pub source: String,
}
