//! Pure normalizers shared by discovery and import
//!
//! - Category labels → canonical category slugs
//! - Display names → per-city unique slugs
//! - Amenity lists/maps → boolean feature maps

pub mod category;
pub mod features;
pub mod slug;

pub use category::{CategoryResolver, Resolution, CANONICAL_CATEGORIES, FALLBACK_CATEGORY};
pub use features::{normalize_features, DogFeatures};
pub use slug::{slugify, SlugAllocator, StoredSlug};

/// Clamp a price level into the 1..=4 range
pub fn clamp_price_level(level: i64) -> i64 {
    level.clamp(1, 4)
}
