//! Category resolver
//!
//! Maps free-text category labels (model output, batch files) onto the fixed set
//! of canonical category slugs. Unknown labels never fail: they resolve to
//! [`FALLBACK_CATEGORY`] and are reported as unmapped so the caller can log them
//! for alias-table maintenance.
//!
//! The alias table is built once at startup (built-in entries plus operator
//! aliases from config) and is read-only afterwards.

use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Category used when a label has no alias
pub const FALLBACK_CATEGORY: &str = "activities";

/// Canonical category slugs with display names
pub const CANONICAL_CATEGORIES: &[(&str, &str)] = &[
    ("restaurants", "Restaurants"),
    ("cafes", "Cafes"),
    ("hotels", "Hotels"),
    ("parks", "Parks"),
    ("beaches", "Beaches"),
    ("shops", "Shops"),
    ("services", "Services"),
    ("activities", "Activities"),
];

/// Built-in aliases, keys already in lookup form (lower-case, single spaces)
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    // Restaurants
    ("restaurant", "restaurants"),
    ("restaurants", "restaurants"),
    ("dining", "restaurants"),
    ("food", "restaurants"),
    ("bistro", "restaurants"),
    ("bistros", "restaurants"),
    ("brasserie", "restaurants"),
    ("trattoria", "restaurants"),
    ("pizzeria", "restaurants"),
    ("tapas", "restaurants"),
    ("pub", "restaurants"),
    ("pubs", "restaurants"),
    ("bar", "restaurants"),
    ("bars", "restaurants"),
    ("beer garden", "restaurants"),
    ("biergarten", "restaurants"),
    ("gastropub", "restaurants"),
    ("taverna", "restaurants"),
    ("restaurante", "restaurants"),
    ("ristorante", "restaurants"),
    ("gaststätte", "restaurants"),
    // Cafes
    ("cafe", "cafes"),
    ("cafes", "cafes"),
    ("café", "cafes"),
    ("cafés", "cafes"),
    ("coffee", "cafes"),
    ("coffee shop", "cafes"),
    ("coffee shops", "cafes"),
    ("coffeehouse", "cafes"),
    ("bakery", "cafes"),
    ("bakeries", "cafes"),
    ("tea room", "cafes"),
    ("kaffee", "cafes"),
    ("cafeteria", "cafes"),
    ("pastelaria", "cafes"),
    // Hotels
    ("hotel", "hotels"),
    ("hotels", "hotels"),
    ("hôtel", "hotels"),
    ("accommodation", "hotels"),
    ("accommodations", "hotels"),
    ("lodging", "hotels"),
    ("hostel", "hotels"),
    ("hostels", "hotels"),
    ("guesthouse", "hotels"),
    ("guest house", "hotels"),
    ("b&b", "hotels"),
    ("bed and breakfast", "hotels"),
    ("apartment", "hotels"),
    ("apartments", "hotels"),
    ("pension", "hotels"),
    // Parks
    ("park", "parks"),
    ("parks", "parks"),
    ("dog park", "parks"),
    ("dog parks", "parks"),
    ("dog run", "parks"),
    ("off leash area", "parks"),
    ("garden", "parks"),
    ("gardens", "parks"),
    ("parc", "parks"),
    ("parque", "parks"),
    ("hundewiese", "parks"),
    ("hundeauslaufgebiet", "parks"),
    ("nature", "parks"),
    ("trail", "parks"),
    ("trails", "parks"),
    ("hiking", "parks"),
    // Beaches
    ("beach", "beaches"),
    ("beaches", "beaches"),
    ("dog beach", "beaches"),
    ("dog beaches", "beaches"),
    ("plage", "beaches"),
    ("playa", "beaches"),
    ("praia", "beaches"),
    ("strand", "beaches"),
    ("hundestrand", "beaches"),
    ("lake", "beaches"),
    // Shops
    ("shop", "shops"),
    ("shops", "shops"),
    ("store", "shops"),
    ("stores", "shops"),
    ("shopping", "shops"),
    ("pet shop", "shops"),
    ("pet store", "shops"),
    ("pet supplies", "shops"),
    ("boutique", "shops"),
    ("mall", "shops"),
    ("market", "shops"),
    // Services
    ("service", "services"),
    ("services", "services"),
    ("vet", "services"),
    ("vets", "services"),
    ("veterinarian", "services"),
    ("veterinarians", "services"),
    ("veterinary", "services"),
    ("groomer", "services"),
    ("groomers", "services"),
    ("grooming", "services"),
    ("dog grooming", "services"),
    ("daycare", "services"),
    ("dog daycare", "services"),
    ("dog hotel", "services"),
    ("kennel", "services"),
    ("boarding", "services"),
    ("dog walker", "services"),
    ("training", "services"),
    // Activities
    ("activity", "activities"),
    ("activities", "activities"),
    ("attraction", "activities"),
    ("attractions", "activities"),
    ("museum", "activities"),
    ("tour", "activities"),
    ("tours", "activities"),
    ("entertainment", "activities"),
    ("events", "activities"),
];

/// Outcome of resolving one label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    /// Canonical category slug (always a member of [`CANONICAL_CATEGORIES`])
    pub slug: &'a str,
    /// False when the label had no alias and the fallback was used
    pub mapped: bool,
}

/// Read-only alias table
#[derive(Debug, Clone)]
pub struct CategoryResolver {
    aliases: HashMap<String, &'static str>,
}

impl CategoryResolver {
    /// Built-in alias table only
    pub fn new() -> Self {
        let aliases = BUILTIN_ALIASES
            .iter()
            .map(|(label, slug)| (label.to_string(), *slug))
            .collect();
        Self { aliases }
    }

    /// Built-in table extended with operator aliases
    ///
    /// Aliases targeting a slug outside the canonical set are skipped with a warning.
    pub fn with_extra_aliases(extra: &BTreeMap<String, String>) -> Self {
        let mut resolver = Self::new();
        for (label, target) in extra {
            match canonical_slug(target.trim()) {
                Some(slug) => {
                    resolver.aliases.insert(lookup_key(label), slug);
                }
                None => {
                    warn!(
                        label = %label,
                        target = %target,
                        "Ignoring category alias: target is not a canonical category"
                    );
                }
            }
        }
        resolver
    }

    /// Resolve a raw label, reporting whether an alias matched
    pub fn resolve_label(&self, raw_label: &str) -> Resolution<'static> {
        match self.aliases.get(&lookup_key(raw_label)) {
            Some(slug) => Resolution {
                slug: *slug,
                mapped: true,
            },
            None => Resolution {
                slug: FALLBACK_CATEGORY,
                mapped: false,
            },
        }
    }

    /// Resolve a raw label to its canonical slug
    pub fn resolve(&self, raw_label: &str) -> &'static str {
        self.resolve_label(raw_label).slug
    }

    /// Canonical categories as `(slug, display name)` pairs
    pub fn canonical(&self) -> &'static [(&'static str, &'static str)] {
        CANONICAL_CATEGORIES
    }
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical slug lookup with `'static` lifetime
fn canonical_slug(slug: &str) -> Option<&'static str> {
    CANONICAL_CATEGORIES
        .iter()
        .map(|(s, _)| *s)
        .find(|s| *s == slug)
}

/// Lower-case, treat `_`/`-` as spaces, collapse whitespace
fn lookup_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
