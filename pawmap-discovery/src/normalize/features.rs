//! Dog amenity normalization
//!
//! Model output and batch files describe amenities either as a list of names
//! (`["water_bowls", "indoor_allowed"]`) or as a map (`{"water_bowls": true}`).
//! Both collapse into one `name → bool` map. Feature names are not validated.

use serde_json::Value;
use std::collections::BTreeMap;

/// Canonical amenity map
pub type DogFeatures = BTreeMap<String, bool>;

/// Coerce any amenity representation into a boolean map
///
/// Absent or unsupported shapes yield an empty map.
pub fn normalize_features(raw: Option<&Value>) -> DogFeatures {
    match raw {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(key, value)| {
                let key = key.trim();
                (!key.is_empty()).then(|| (key.to_string(), truthy(value)))
            })
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| (name.to_string(), true))
            .collect(),
        _ => DogFeatures::new(),
    }
}

/// Boolean coercion for feature values
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "" | "false" | "no" | "n" | "0"
        ),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}
