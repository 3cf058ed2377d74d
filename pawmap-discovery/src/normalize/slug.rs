//! Slug generation and per-city disambiguation
//!
//! `slugify` is a pure function. [`SlugAllocator`] carries the disambiguation
//! state for one import run: slugs already handed out per city, how often each
//! base slug occurs in the run, and the slugs the store already holds. It never
//! queries the store itself, so identical input against identical stored rows
//! always yields identical slugs.

use std::collections::{BTreeMap, HashMap, HashSet};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Slug used when a name has no ASCII-representable characters
const EMPTY_SLUG_FALLBACK: &str = "place";

/// Turn a display name into a URL-safe ASCII identifier
///
/// Lower-cases, strips diacritics, drops anything outside `[a-z0-9 -]`,
/// collapses whitespace/hyphen runs into one hyphen and trims hyphens.
pub fn slugify(name: &str) -> String {
    let mut folded = String::with_capacity(name.len());
    for c in name.nfd().filter(|c| !is_combining_mark(*c)) {
        match c {
            'ß' => folded.push_str("ss"),
            'æ' | 'Æ' => folded.push_str("ae"),
            'œ' | 'Œ' => folded.push_str("oe"),
            'ø' | 'Ø' => folded.push('o'),
            'ł' | 'Ł' => folded.push('l'),
            'đ' | 'Đ' => folded.push('d'),
            'þ' | 'Þ' => folded.push_str("th"),
            other => folded.extend(other.to_lowercase()),
        }
    }

    let mut slug = String::with_capacity(folded.len());
    let mut pending_separator = false;
    for c in folded.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        } else if c == '-' || c.is_whitespace() {
            pending_separator = true;
        }
        // Everything else is dropped without acting as a separator
    }

    slug
}

/// Slug the store already holds for a city, with the place that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSlug {
    pub slug: String,
    pub name: String,
    pub address: String,
}

/// Name and address folded for comparison
type Identity = (String, String);

fn identity(name: &str, address: &str) -> Identity {
    (
        base_slug(name),
        address.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
    )
}

/// Per-run slug disambiguation, scoped by city
///
/// Build it with [`SlugAllocator::plan`] over the whole run first so that base
/// slugs occurring more than once in a city are known before any is assigned,
/// then register each city's stored rows with [`SlugAllocator::remember_stored`].
///
/// A record whose name and address match a stored row keeps that row's slug,
/// so a place imported once is never moved to a new slug when more places with
/// the same name show up in later runs.
#[derive(Debug, Default)]
pub struct SlugAllocator {
    /// (city, base slug) → occurrences in this run
    base_counts: HashMap<(String, String), usize>,
    /// (city, identity) of every record in this run
    run_identities: HashSet<(String, Identity)>,
    /// city → stored slug → identity of the row holding it
    stored: HashMap<String, BTreeMap<String, Identity>>,
    /// city → slugs already assigned in this run
    assigned: HashMap<String, HashSet<String>>,
    /// (city, candidate slug) → collisions seen so far
    collisions: HashMap<(String, String), usize>,
}

impl SlugAllocator {
    /// Allocator with no knowledge of upcoming rows
    pub fn new() -> Self {
        Self::default()
    }

    /// Count base slugs per city over `(city, name, address)` entries in run order
    pub fn plan<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        let mut allocator = Self::new();
        for (city, name, address) in entries {
            *allocator
                .base_counts
                .entry((city.to_string(), base_slug(name)))
                .or_insert(0) += 1;
            allocator
                .run_identities
                .insert((city.to_string(), identity(name, address)));
        }
        allocator
    }

    /// Register the slugs `city` already holds in the store
    pub fn remember_stored(&mut self, city: &str, rows: &[StoredSlug]) {
        let stored = self.stored.entry(city.to_string()).or_default();
        for row in rows {
            stored.insert(row.slug.clone(), identity(&row.name, &row.address));
        }
    }

    /// Assign a slug unique within `city`
    ///
    /// Resolution order:
    /// 1. a stored row with the same name and address keeps its slug
    /// 2. a base slug that occurs more than once in the run takes the
    ///    slugified neighborhood as suffix when one is given
    /// 3. anything still colliding gets `-2`, `-3`, … counted from the
    ///    collisions already seen for that slug
    ///
    /// A stored slug held by a place with a different name is never reused.
    /// One held by the same name but another address is reused (address
    /// correction) unless a record in this run matches that row exactly.
    pub fn assign(
        &mut self,
        city: &str,
        name: &str,
        address: &str,
        neighborhood: Option<&str>,
    ) -> String {
        let own = identity(name, address);
        let none_stored = BTreeMap::new();
        let stored = self.stored.get(city).unwrap_or(&none_stored);
        let taken = self.assigned.entry(city.to_string()).or_default();

        let exact = stored
            .iter()
            .find(|(slug, held_by)| **held_by == own && !taken.contains(*slug))
            .map(|(slug, _)| slug.clone());
        match exact {
            Some(slug) => {
                taken.insert(slug.clone());
                slug
            }
            None => {
                let base = own.0.clone();
                let shared = self
                    .base_counts
                    .get(&(city.to_string(), base.clone()))
                    .copied()
                    .unwrap_or(0)
                    > 1;

                let neighborhood_slug = neighborhood.map(slugify).filter(|s| !s.is_empty());
                let candidate = match neighborhood_slug {
                    Some(suffix) if shared => format!("{}-{}", base, suffix),
                    _ => base,
                };

                let reusable = match stored.get(&candidate) {
                    None => true,
                    Some(held_by) => {
                        held_by.0 == own.0
                            && !self.run_identities.contains(&(city.to_string(), held_by.clone()))
                    }
                };

                if reusable && taken.insert(candidate.clone()) {
                    candidate
                } else {
                    let collisions = self
                        .collisions
                        .entry((city.to_string(), candidate.clone()))
                        .or_insert(0);
                    let mut counter = *collisions + 2;
                    let mut slug = format!("{}-{}", candidate, counter);
                    while taken.contains(&slug) || stored.contains_key(&slug) {
                        counter += 1;
                        slug = format!("{}-{}", candidate, counter);
                    }
                    *collisions = counter - 1;
                    taken.insert(slug.clone());
                    slug
                }
            }
        }
    }
}

fn base_slug(name: &str) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        EMPTY_SLUG_FALLBACK.to_string()
    } else {
        slug
    }
}
