//! Research prompt construction

use pawmap_common::db::CityRecord;
use std::fmt::Write;

/// City facts embedded in every research prompt
#[derive(Debug, Clone, PartialEq)]
pub struct CityContext {
    pub slug: String,
    pub name: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub language: String,
    pub dog_regulations: String,
}

impl From<&CityRecord> for CityContext {
    fn from(city: &CityRecord) -> Self {
        Self {
            slug: city.slug.clone(),
            name: city.name.clone(),
            country: city.country.clone(),
            latitude: city.latitude,
            longitude: city.longitude,
            language: city.language.clone(),
            dog_regulations: city.dog_regulations.clone(),
        }
    }
}

/// Output contract the parser expects back
const OUTPUT_FORMAT: &str = r#"Respond with a single JSON array and nothing else. Each element:
{
  "name": "Official name (required)",
  "localizedName": "Name in the local language, if different",
  "category": "Category label",
  "address": "Full street address (required)",
  "neighborhood": "District or neighborhood",
  "phone": "Phone number with country code",
  "website": "https://...",
  "description": "One or two sentences in English on why it is dog-friendly",
  "localizedDescription": "The same description in the local language",
  "dogFeatures": {"water_bowls": true, "indoor_allowed": false, "outdoor_seating": true, "off_leash": false, "dog_menu": false, "treats": false},
  "priceLevel": 2,
  "confidence": 80,
  "reasoning": "Evidence that dogs are welcome"
}
priceLevel is 1 (cheap) to 4 (expensive). confidence is 0-100 and reflects how sure you
are that the place exists and currently welcomes dogs. Omit places you cannot verify.
Return [] if you find nothing."#;

/// Prompt for a city and category set
///
/// An empty category set asks for dog-friendly places of any kind.
pub fn build_prompt(
    city: &CityContext,
    categories: &[String],
    max_results: u32,
    language: &str,
) -> String {
    let mut prompt = String::with_capacity(OUTPUT_FORMAT.len() + 512);

    let subject = if categories.is_empty() {
        "places".to_string()
    } else {
        categories.join(", ")
    };
    let _ = writeln!(
        prompt,
        "You are researching dog-friendly {} in {}, {}.",
        subject, city.name, city.country
    );
    let _ = writeln!(
        prompt,
        "Find up to {} real, currently operating establishments where dogs are welcome.",
        max_results
    );
    prompt.push('\n');

    prompt.push_str("City context:\n");
    if let (Some(lat), Some(lon)) = (city.latitude, city.longitude) {
        let _ = writeln!(prompt, "- Coordinates: {:.4}, {:.4}", lat, lon);
    }
    let _ = writeln!(prompt, "- Local language: {}", city.language);
    if !city.dog_regulations.trim().is_empty() {
        let _ = writeln!(prompt, "- Local dog regulations: {}", city.dog_regulations.trim());
    }
    if language != city.language {
        let _ = writeln!(
            prompt,
            "- Write localizedName and localizedDescription in: {}",
            language
        );
    }
    prompt.push('\n');

    prompt.push_str(OUTPUT_FORMAT);
    prompt
}
