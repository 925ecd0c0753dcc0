//! Adapter for Punk API beer objects.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::categorize::classify;
use super::coerce::{first_brewed, identity, measure, number, text};
use super::record::{Hop, Ingredients, Malt, MashStep, Method, NormalizedRecord, SourceTag};
use super::AdaptError;

/// Yeast name from `ingredients.yeast`, which may be a string, an object
/// with a `name`, or a list of either.
fn yeast_name(ingredients: Option<&Value>) -> Option<String> {
    let yeast = ingredients?.get("yeast")?;
    let yeast = match yeast {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match yeast {
        Value::Object(obj) => text(obj.get("name")),
        other => text(Some(other)),
    }
}

fn ingredients(raw: Option<&Value>) -> Ingredients {
    let Some(raw) = raw else {
        return Ingredients::default();
    };

    let malts = raw
        .get("malt")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|m| Malt {
                    name: text(m.get("name")).unwrap_or_default(),
                    amount: measure(m.get("amount")),
                })
                .collect()
        })
        .unwrap_or_default();

    let hops = raw
        .get("hops")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|h| Hop {
                    name: text(h.get("name")).unwrap_or_default(),
                    amount: measure(h.get("amount")),
                    add: text(h.get("add")).unwrap_or_default(),
                    attribute: text(h.get("attribute")).unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    Ingredients {
        malts,
        hops,
        yeast: yeast_name(Some(raw)),
    }
}

fn method(raw: Option<&Value>) -> Method {
    let Some(raw) = raw else {
        return Method::default();
    };

    let mash_temp = raw
        .get("mash_temp")
        .and_then(Value::as_array)
        .map(|steps| {
            steps
                .iter()
                .map(|s| MashStep {
                    temp: measure(s.get("temp")),
                    duration: number(s.get("duration")),
                })
                .collect()
        })
        .unwrap_or_default();

    Method {
        mash_temp,
        fermentation_temp: raw.get("fermentation").and_then(|f| measure(f.get("temp"))),
        twist: text(raw.get("twist")),
    }
}

/// Map one Punk API beer into a [`NormalizedRecord`].
pub fn adapt_beer(raw: &Value, processed_at: DateTime<Utc>) -> Result<NormalizedRecord, AdaptError> {
    if !raw.is_object() {
        return Err(AdaptError::NotAnObject);
    }
    let beer_id = identity(raw.get("id")).ok_or(AdaptError::MissingField("id"))?;
    let name = text(raw.get("name")).ok_or(AdaptError::MissingField("name"))?;

    let tagline = text(raw.get("tagline"));
    let description = text(raw.get("description"));
    let yeast = yeast_name(raw.get("ingredients"));
    let style_text = [
        Some(name.as_str()),
        tagline.as_deref(),
        description.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");
    let classification = classify(yeast.as_deref(), &style_text);

    let mut record = NormalizedRecord::new(beer_id, name, SourceTag::PunkApi, processed_at);
    record.tagline = tagline;
    record.description = description;
    record.image_url = text(raw.get("image_url"));
    record.first_brewed = first_brewed(raw.get("first_brewed").and_then(Value::as_str));
    record.abv = number(raw.get("abv"));
    record.ibu = number(raw.get("ibu"));
    record.target_fg = number(raw.get("target_fg"));
    record.target_og = number(raw.get("target_og"));
    record.ebc = number(raw.get("ebc"));
    record.srm = number(raw.get("srm"));
    record.ph = number(raw.get("ph"));
    record.attenuation_level = number(raw.get("attenuation_level"));
    record.volume = measure(raw.get("volume"));
    record.boil_volume = measure(raw.get("boil_volume"));
    record.category = classification.category;
    record.subcategory = yeast.map(|y| y.to_lowercase());
    record.category_confidence = classification.confidence;
    record.ingredients = ingredients(raw.get("ingredients"));
    record.method = method(raw.get("method"));
    record.food_pairing = raw
        .get("food_pairing")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| text(Some(v))).collect())
        .unwrap_or_default();
    record.brewers_tips = text(raw.get("brewers_tips"));
    record.contributed_by = text(raw.get("contributed_by"));
    Ok(record)
}
