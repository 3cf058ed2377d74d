//! Response parser / validator
//!
//! Turns provider text into candidates in four independent stages:
//! 1. [`strip_fence`]: keep the interior of a fenced block if there is one
//! 2. [`array_literals`]: balanced `[...]` literals, tried in order
//! 3. [`decode_array`]: decode one as JSON; anything but an array is `None`
//! 4. [`coerce_candidate`]: default every field, drop elements without name/address
//!
//! No stage returns an error. Text without a usable payload yields zero
//! candidates.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::{
    CandidatePlace, PlaceExtras, DEFAULT_CONFIDENCE, DEFAULT_PRICE_LEVEL, SOURCE_LLM_RESEARCH,
};
use crate::normalize::{clamp_price_level, normalize_features};

const FENCE: &str = "```";

/// Parse provider text into validated candidates
pub fn parse_candidates(raw_text: &str) -> Vec<CandidatePlace> {
    let body = strip_fence(raw_text);

    let mut literals = 0usize;
    let payload = array_literals(body).find_map(|array_text| {
        literals += 1;
        decode_array(array_text).filter(|elements| elements.iter().any(Value::is_object))
    });

    let Some(elements) = payload else {
        if literals == 0 {
            debug!(chars = raw_text.len(), "No array literal in provider response");
        } else {
            warn!(literals, "No array literal in provider response decoded to objects");
        }
        return Vec::new();
    };

    let total = elements.len();
    let candidates: Vec<CandidatePlace> = elements
        .iter()
        .filter_map(|element| coerce_candidate(element, SOURCE_LLM_RESEARCH))
        .collect();

    if candidates.len() < total {
        debug!(
            kept = candidates.len(),
            dropped = total - candidates.len(),
            "Dropped candidates missing name or address"
        );
    }

    candidates
}

/// Interior of the first fenced block, or the whole text when there is none
///
/// A language tag right after the opening fence (```` ```json ````) is
/// skipped; the body starts there whether or not a newline follows. An
/// unterminated fence keeps everything after the opening fence.
pub fn strip_fence(text: &str) -> &str {
    let Some(open) = text.find(FENCE) else {
        return text;
    };

    let after_open = &text[open + FENCE.len()..];
    let tag_len = after_open
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-')))
        .unwrap_or(after_open.len());
    let body = after_open[tag_len..].trim_start();

    match body.find(FENCE) {
        Some(close) => &body[..close],
        None => body,
    }
}

/// Every balanced array literal in `text`, ordered by opening bracket
///
/// Prose often carries bracketed citations (`[1]`) ahead of the payload, so
/// callers keep going until one decodes.
pub fn array_literals(text: &str) -> impl Iterator<Item = &str> + '_ {
    text.match_indices('[')
        .filter_map(move |(start, _)| balanced_end(&text[start..]).map(|end| &text[start..start + end]))
}

/// Length of the balanced array literal opening at the start of `text`
///
/// Brackets inside JSON strings (including escaped quotes) do not count.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// Decode an array literal; `None` for invalid JSON or a non-array value
pub fn decode_array(array_text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(array_text) {
        Ok(Value::Array(elements)) => Some(elements),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "JSON decode failed");
            None
        }
    }
}

/// Coerce one decoded element into a candidate
///
/// Accepts camelCase and snake_case field names. Returns `None` for
/// non-objects and for elements whose name or address is empty.
pub fn coerce_candidate(element: &Value, default_source: &str) -> Option<CandidatePlace> {
    let obj = element.as_object()?;

    let name = string_field(obj, &["name"]);
    let address = string_field(obj, &["address"]);
    if name.is_empty() || address.is_empty() {
        return None;
    }

    let source = string_field(obj, &["source"]);

    Some(CandidatePlace {
        name,
        localized_name: optional_string_field(
            obj,
            &["localizedName", "localized_name", "nameLocal", "name_local"],
        ),
        category: string_field(obj, &["category", "type"]),
        address,
        neighborhood: optional_string_field(obj, &["neighborhood", "neighbourhood", "district"]),
        phone: optional_string_field(obj, &["phone", "phoneNumber", "phone_number"]),
        website: optional_string_field(obj, &["website", "url"]),
        description: string_field(obj, &["description"]),
        localized_description: optional_string_field(
            obj,
            &[
                "localizedDescription",
                "localized_description",
                "descriptionLocal",
                "description_local",
            ],
        ),
        dog_features: normalize_features(field(obj, &["dogFeatures", "dog_features"])),
        price_level: coerce_price_level(field(obj, &["priceLevel", "price_level"])),
        confidence: coerce_confidence(field(obj, &["confidence"])),
        reasoning: string_field(obj, &["reasoning"]),
        source: if source.is_empty() {
            default_source.to_string()
        } else {
            source
        },
    })
}

/// Batch-file provenance fields of one element
pub fn coerce_extras(element: &Value) -> PlaceExtras {
    let Some(obj) = element.as_object() else {
        return PlaceExtras::default();
    };

    PlaceExtras {
        google_place_id: optional_string_field(obj, &["googlePlaceId", "google_place_id"]),
        google_maps_url: optional_string_field(obj, &["googleMapsUrl", "google_maps_url"]),
        photo_refs: string_list(field(obj, &["photoRefs", "photo_refs"])),
        opening_hours: string_list(field(obj, &["openingHours", "opening_hours"])),
        enriched: field(obj, &["enriched"]).and_then(Value::as_bool).unwrap_or(false),
    }
}

/// Price level from a number, numeric string or `$` string; default 2
pub fn coerce_price_level(value: Option<&Value>) -> i64 {
    let level = match value {
        Some(Value::Number(n)) => n.as_f64().map(|f| f.round() as i64),
        Some(Value::String(s)) => {
            let s = s.trim();
            if !s.is_empty() && s.chars().all(|c| c == '$' || c == '€' || c == '£') {
                Some(s.chars().count() as i64)
            } else {
                s.parse::<f64>().ok().map(|f| f.round() as i64)
            }
        }
        _ => None,
    };

    clamp_price_level(level.unwrap_or(DEFAULT_PRICE_LEVEL))
}

/// Confidence in 0..=100; default 50
///
/// Fractions strictly between 0 and 1 are read as probabilities (0.85 → 85).
pub fn coerce_confidence(value: Option<&Value>) -> i64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };

    match raw {
        Some(f) if f.is_finite() => {
            let scaled = if f > 0.0 && f < 1.0 { f * 100.0 } else { f };
            (scaled.round() as i64).clamp(0, 100)
        }
        _ => DEFAULT_CONFIDENCE,
    }
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| obj.get(*name))
}

/// String coercion: strings trimmed, numbers/bools rendered, everything else empty
fn string_field(obj: &Map<String, Value>, names: &[&str]) -> String {
    match field(obj, names) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn optional_string_field(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    Some(string_field(obj, names)).filter(|s| !s.is_empty())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ARRAY: &str = r#"[
        {
            "name": "Café du Soleil",
            "category": "cafe",
            "address": "12 Rue du Soleil",
            "neighborhood": "Old Town",
            "dogFeatures": ["water_bowls", "treats"],
            "priceLevel": 2,
            "confidence": 88,
            "reasoning": "Listed on two dog-friendly guides"
        },
        {
            "name": "Parc [Central]",
            "category": "dog_park",
            "address": "Avenue \"Verte\" 3",
            "dogFeatures": {"off_leash": true}
        }
    ]"#;

    #[test]
    fn test_fenced_and_bare_arrays_parse_identically() {
        let fenced = format!("Here you go:\n```json\n{}\n```\nLet me know!", ARRAY);

        let bare = parse_candidates(ARRAY);
        let wrapped = parse_candidates(&fenced);

        assert_eq!(bare.len(), 2);
        assert_eq!(bare, wrapped);
    }

    #[test]
    fn test_prose_around_array_is_ignored() {
        let text = format!("I found these places. {} Hope this helps.", ARRAY);
        assert_eq!(parse_candidates(&text).len(), 2);
    }

    #[test]
    fn test_prose_without_array_is_empty() {
        assert!(parse_candidates("Sorry, I could not find any establishments.").is_empty());
        assert!(parse_candidates("").is_empty());
    }

    #[test]
    fn test_malformed_or_non_array_payload_is_empty() {
        assert!(parse_candidates("[{\"name\": \"x\", }").is_empty());
        assert!(parse_candidates("```json\n{\"places\": 3}\n```").is_empty());
        assert!(parse_candidates("[1, 2, 3]").is_empty());
    }

    #[test]
    fn test_defaults_applied() {
        let candidates = parse_candidates(ARRAY);
        let park = &candidates[1];

        assert_eq!(park.name, "Parc [Central]");
        assert_eq!(park.address, "Avenue \"Verte\" 3");
        assert_eq!(park.price_level, 2);
        assert_eq!(park.confidence, 50);
        assert_eq!(park.description, "");
        assert_eq!(park.source, SOURCE_LLM_RESEARCH);
        assert_eq!(park.dog_features.get("off_leash"), Some(&true));

        let cafe = &candidates[0];
        assert_eq!(cafe.neighborhood.as_deref(), Some("Old Town"));
        assert_eq!(cafe.confidence, 88);
        assert_eq!(cafe.dog_features.len(), 2);
    }

    #[test]
    fn test_elements_without_name_or_address_dropped() {
        let text = r#"[
            {"name": "", "address": "1 Main St"},
            {"name": "No Address"},
            {"name": "   ", "address": "2 Main St"},
            "not an object",
            {"name": "Kept", "address": "3 Main St"}
        ]"#;

        let candidates = parse_candidates(text);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Kept");
    }

    #[test]
    fn test_strip_fence_variants() {
        assert_eq!(strip_fence("```\n[1]\n```"), "[1]\n");
        assert_eq!(strip_fence("```json\n[2]"), "[2]");
        assert_eq!(strip_fence("no fence [3]"), "no fence [3]");
        assert_eq!(strip_fence("```json [4] ```"), "[4] ");
        assert_eq!(strip_fence("```[5]```"), "[5]");
    }

    #[test]
    fn test_single_line_fences_parse_like_bare_array() {
        let bare = r#"[{"name":"Bark Bar","address":"1 Main St"}]"#;
        let expected = parse_candidates(bare);
        assert_eq!(expected.len(), 1);

        assert_eq!(parse_candidates(&format!("```json {} ```", bare)), expected);
        assert_eq!(parse_candidates(&format!("```{}```", bare)), expected);
        assert_eq!(
            parse_candidates(&format!("Results:\n```json [{{\"name\":\"Bark Bar\",\n\"address\":\"1 Main St\"}}]\n```")),
            expected
        );
    }

    #[test]
    fn test_citations_before_payload_are_skipped() {
        let text = format!("Sources [1] and [2] confirm these places:\n{}", ARRAY);
        assert_eq!(parse_candidates(&text).len(), 2);

        let fenced = format!("See [3].\n```json\n{}\n```", ARRAY);
        assert_eq!(parse_candidates(&fenced).len(), 2);

        assert!(parse_candidates("Sources [1] and [2], nothing else").is_empty());
    }

    #[test]
    fn test_array_literals_respect_strings() {
        let text = r#"prefix ["a]", "b\"]", ["c"]] suffix ]"#;
        assert_eq!(array_literals(text).next(), Some(r#"["a]", "b\"]", ["c"]]"#));
        assert_eq!(array_literals("[unterminated").next(), None);
        assert_eq!(array_literals("no brackets").count(), 0);

        let literals: Vec<&str> = array_literals("see [1], then [[2], [3]]").collect();
        assert_eq!(literals, vec!["[1]", "[[2], [3]]", "[2]", "[3]"]);
    }

    #[test]
    fn test_price_level_coercion() {
        assert_eq!(coerce_price_level(Some(&json!(7))), 4);
        assert_eq!(coerce_price_level(Some(&json!(0))), 1);
        assert_eq!(coerce_price_level(None), 2);
        assert_eq!(coerce_price_level(Some(&json!("3"))), 3);
        assert_eq!(coerce_price_level(Some(&json!("$$$"))), 3);
        assert_eq!(coerce_price_level(Some(&json!("cheap"))), 2);
        assert_eq!(coerce_price_level(Some(&Value::Null)), 2);
    }

    #[test]
    fn test_confidence_coercion() {
        assert_eq!(coerce_confidence(Some(&json!(85))), 85);
        assert_eq!(coerce_confidence(Some(&json!(0.85))), 85);
        assert_eq!(coerce_confidence(Some(&json!("90%"))), 90);
        assert_eq!(coerce_confidence(Some(&json!(250))), 100);
        assert_eq!(coerce_confidence(Some(&json!(-5))), 0);
        assert_eq!(coerce_confidence(None), 50);
        assert_eq!(coerce_confidence(Some(&json!("high"))), 50);
    }

    #[test]
    fn test_snake_case_fields_and_numeric_phone() {
        let element = json!({
            "name": "Hundecafé",
            "address": "Hauptstraße 1",
            "name_local": "Hundecafé Berlin",
            "phone": 4930123456u64,
            "price_level": 1,
            "dog_features": {"water_bowls": "yes"},
            "source": "curated"
        });

        let candidate = coerce_candidate(&element, SOURCE_LLM_RESEARCH).unwrap();
        assert_eq!(candidate.localized_name.as_deref(), Some("Hundecafé Berlin"));
        assert_eq!(candidate.phone.as_deref(), Some("4930123456"));
        assert_eq!(candidate.price_level, 1);
        assert_eq!(candidate.dog_features.get("water_bowls"), Some(&true));
        assert_eq!(candidate.source, "curated");
    }

    #[test]
    fn test_extras_coercion() {
        let element = json!({
            "googlePlaceId": "ChIJ123",
            "photoRefs": ["a", "", 3, "b"],
            "openingHours": ["Mon 9-17"],
            "enriched": true
        });

        let extras = coerce_extras(&element);
        assert_eq!(extras.google_place_id.as_deref(), Some("ChIJ123"));
        assert_eq!(extras.photo_refs, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(extras.opening_hours.len(), 1);
        assert!(extras.enriched);
        assert_eq!(coerce_extras(&json!(null)), PlaceExtras::default());
    }
}
