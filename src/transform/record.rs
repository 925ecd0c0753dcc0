//! Canonical record shape shared by every stage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Beer family. Anything that cannot be classified is `Other`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Ale,
    Lager,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ale => "ale",
            Category::Lager => "lager",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ale" => Ok(Category::Ale),
            "lager" => Ok(Category::Lager),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

/// Upstream a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTag {
    #[serde(rename = "punk_api")]
    PunkApi,
    #[serde(rename = "openbrewery_db")]
    OpenBreweryDb,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::PunkApi => "punk_api",
            SourceTag::OpenBreweryDb => "openbrewery_db",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "punk_api" => Ok(SourceTag::PunkApi),
            "openbrewery_db" => Ok(SourceTag::OpenBreweryDb),
            other => Err(format!("unknown data source '{}'", other)),
        }
    }
}

/// A quantity with its unit (volumes, weights, temperatures).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Malt {
    pub name: String,
    pub amount: Option<Measure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub name: String,
    pub amount: Option<Measure>,
    #[serde(default)]
    pub add: String,
    #[serde(default)]
    pub attribute: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ingredients {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub malts: Vec<Malt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hops: Vec<Hop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yeast: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MashStep {
    pub temp: Option<Measure>,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Method {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mash_temp: Vec<MashStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fermentation_temp: Option<Measure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twist: Option<String>,
}

/// Brewery details carried by records synthesized from brewery listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreweryInfo {
    pub name: Option<String>,
    pub brewery_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub website_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// The pipeline's normalized beer record.
///
/// `beer_id` and `category` are always set. Numeric attributes are `None`
/// when the upstream value is missing or not numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub beer_id: String,
    pub name: String,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub first_brewed: Option<String>,

    #[serde(default)]
    pub abv: Option<f64>,
    #[serde(default)]
    pub ibu: Option<f64>,
    #[serde(default)]
    pub target_fg: Option<f64>,
    #[serde(default)]
    pub target_og: Option<f64>,
    #[serde(default)]
    pub ebc: Option<f64>,
    #[serde(default)]
    pub srm: Option<f64>,
    #[serde(default)]
    pub ph: Option<f64>,
    #[serde(default)]
    pub attenuation_level: Option<f64>,
    #[serde(default)]
    pub volume: Option<Measure>,
    #[serde(default)]
    pub boil_volume: Option<Measure>,

    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub category_confidence: f64,

    #[serde(default)]
    pub ingredients: Ingredients,
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub food_pairing: Vec<String>,
    #[serde(default)]
    pub brewers_tips: Option<String>,
    #[serde(default)]
    pub contributed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brewery_info: Option<BreweryInfo>,

    pub data_source: SourceTag,
    pub processed_at: DateTime<Utc>,
}

impl NormalizedRecord {
    /// Minimal record; adapters fill in the rest.
    pub fn new(
        beer_id: impl Into<String>,
        name: impl Into<String>,
        data_source: SourceTag,
        processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            beer_id: beer_id.into(),
            name: name.into(),
            tagline: None,
            description: None,
            image_url: None,
            first_brewed: None,
            abv: None,
            ibu: None,
            target_fg: None,
            target_og: None,
            ebc: None,
            srm: None,
            ph: None,
            attenuation_level: None,
            volume: None,
            boil_volume: None,
            category: Category::Other,
            subcategory: None,
            category_confidence: 0.5,
            ingredients: Ingredients::default(),
            method: Method::default(),
            food_pairing: Vec::new(),
            brewers_tips: None,
            contributed_by: None,
            brewery_info: None,
            data_source,
            processed_at,
        }
    }
}
