//! Curated batch files
//!
//! ```json
//! { "city": "lisbon", "places": [ { "name": "...", "address": "...", ... } ] }
//! ```
//!
//! Places use the candidate field names plus optional `city`,
//! `googlePlaceId`, `googleMapsUrl`, `photoRefs`, `openingHours` and
//! `enriched`. The record city is the place's own `city`, else the document
//! `city`, else the operator-supplied default.

use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::discovery::parser::{coerce_candidate, coerce_extras};
use crate::import::ImportError;
use crate::models::{ImportRecord, SOURCE_BATCH_IMPORT};

#[derive(Debug, Deserialize)]
struct BatchDocument {
    #[serde(default)]
    city: Option<String>,
    places: Vec<Value>,
}

/// Records read from one batch file
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedBatch {
    pub path: PathBuf,
    pub records: Vec<ImportRecord>,
    /// Places dropped for an empty name or address
    pub invalid: usize,
}

/// Expand directories into their `*.json` files, sorted by name
///
/// Plain file arguments are kept in the order given.
pub fn collect_batch_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>, ImportError> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|source| ImportError::Read {
                path: path.clone(),
                source,
            })?;

            let mut found: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            found.sort();

            debug!(dir = %path.display(), files = found.len(), "Batch directory expanded");
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }

    Ok(files)
}

/// Read and parse one batch file
pub async fn load_batch_file(
    path: &Path,
    default_city: Option<&str>,
) -> Result<LoadedBatch, ImportError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ImportError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    parse_batch_document(&text, path, default_city)
}

/// Parse batch file content
pub fn parse_batch_document(
    text: &str,
    path: &Path,
    default_city: Option<&str>,
) -> Result<LoadedBatch, ImportError> {
    let document: BatchDocument =
        serde_json::from_str(text).map_err(|e| ImportError::InvalidFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let document_city = non_empty(document.city.as_deref()).or(non_empty(default_city));
    let mut records = Vec::with_capacity(document.places.len());
    let mut invalid = 0;

    for (index, element) in document.places.iter().enumerate() {
        let Some(place) = coerce_candidate(element, SOURCE_BATCH_IMPORT) else {
            warn!(
                file = %path.display(),
                index,
                "Skipping place without name or address"
            );
            invalid += 1;
            continue;
        };

        let place_city = non_empty(element.get("city").and_then(Value::as_str));
        let Some(city) = place_city.or(document_city) else {
            return Err(ImportError::InvalidFile {
                path: path.to_path_buf(),
                message: format!(
                    "place {} ({}) has no city; set \"city\" in the file or pass --city",
                    index, place.name
                ),
            });
        };

        records.push(ImportRecord {
            city_slug: city.to_string(),
            place,
            extras: coerce_extras(element),
        });
    }

    debug!(
        file = %path.display(),
        records = records.len(),
        invalid,
        "Batch file parsed"
    );

    Ok(LoadedBatch {
        path: path.to_path_buf(),
        records,
        invalid,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
