//! Adapter that turns Open Brewery DB listings into house-beer records.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::categorize::{brewery_category, estimate_abv, estimate_ibu, food_pairing};
use super::coerce::{identity, number, text};
use super::record::{BreweryInfo, Category, NormalizedRecord, SourceTag};
use super::AdaptError;

const CONTRIBUTOR: &str = "Open Brewery DB";
const BREWERY_CONFIDENCE: f64 = 0.7;

fn address(raw: &Value) -> Option<String> {
    let street = text(raw.get("street")).or_else(|| text(raw.get("address_1")));
    let parts: Vec<String> = [
        street,
        text(raw.get("city")),
        text(raw.get("state")),
        text(raw.get("postal_code")),
    ]
    .into_iter()
    .flatten()
    .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn description(name: &str, city: &str, state: &str, brewery_type: &str, category: Category) -> String {
    match category {
        Category::Ale => format!(
            "A well-crafted ale from {name}, showcasing the brewing heritage of {city}, {state}. \
             This {brewery_type} brewery specializes in hop-forward ales."
        ),
        Category::Lager => format!(
            "A crisp, clean lager from {name} in {city}, {state}. \
             This {brewery_type} brewery focuses on traditional lager brewing."
        ),
        Category::Other => format!(
            "A specialty beer from {name}, representing the brewing scene of {city}, {state}. \
             This {brewery_type} brewery experiments with various styles."
        ),
    }
}

/// Map one brewery into a synthesized [`NormalizedRecord`].
///
/// The record id is `brewery_<id>` so it never collides with beer ids.
pub fn adapt_brewery(
    raw: &Value,
    processed_at: DateTime<Utc>,
) -> Result<NormalizedRecord, AdaptError> {
    if !raw.is_object() {
        return Err(AdaptError::NotAnObject);
    }
    let id = identity(raw.get("id")).ok_or(AdaptError::MissingField("id"))?;
    let name = text(raw.get("name")).ok_or(AdaptError::MissingField("name"))?;

    let brewery_type = text(raw.get("brewery_type"))
        .map(|t| t.to_lowercase())
        .unwrap_or_else(|| "unknown".to_string());
    let city = text(raw.get("city"));
    let state = text(raw.get("state")).or_else(|| text(raw.get("state_province")));
    let category = brewery_category(&brewery_type);

    let mut record = NormalizedRecord::new(
        format!("brewery_{}", id),
        format!("{} House Beer", name),
        SourceTag::OpenBreweryDb,
        processed_at,
    );
    record.tagline = Some(format!("Signature beer from {}", name));
    record.description = Some(description(
        &name,
        city.as_deref().unwrap_or("Unknown"),
        state.as_deref().unwrap_or("Unknown"),
        &brewery_type,
        category,
    ));
    record.abv = Some(estimate_abv(&brewery_type, category, state.as_deref()));
    record.ibu = Some(estimate_ibu(&brewery_type, category, state.as_deref()));
    record.category = category;
    record.subcategory = Some(brewery_type.clone());
    record.category_confidence = BREWERY_CONFIDENCE;
    record.food_pairing = food_pairing(category);
    record.brewers_tips = Some(format!(
        "Visit {} to experience their full range of beers on tap.",
        name
    ));
    record.contributed_by = Some(CONTRIBUTOR.to_string());
    record.brewery_info = Some(BreweryInfo {
        name: Some(name),
        brewery_type: Some(brewery_type),
        address: address(raw),
        city,
        state,
        postal_code: text(raw.get("postal_code")),
        country: text(raw.get("country")),
        phone: text(raw.get("phone")),
        website_url: text(raw.get("website_url")),
        latitude: number(raw.get("latitude")),
        longitude: number(raw.get("longitude")),
    });
    Ok(record)
}
