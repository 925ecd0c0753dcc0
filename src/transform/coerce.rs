//! Lenient readers for loosely typed upstream JSON.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::record::Measure;

static MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{2})/(\d{4})$").unwrap());
static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}$").unwrap());
static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Number from a JSON number or numeric string; `None` for anything else.
pub fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Trimmed string, `None` when missing, blank or not a string.
pub fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        _ => None,
    }
}

/// Identifier from either a string or an integer.
pub fn identity(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `{ "value": .., "unit": .. }` object.
pub fn measure(value: Option<&Value>) -> Option<Measure> {
    let obj = value?.as_object()?;
    if obj.is_empty() {
        return None;
    }
    Some(Measure {
        value: number(obj.get("value")),
        unit: text(obj.get("unit")).unwrap_or_default(),
    })
}

/// Normalize a brew date to `YYYY-MM-DD`.
///
/// Accepts `MM/YYYY`, `YYYY` and ISO dates; anything else is dropped.
pub fn first_brewed(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if let Some(caps) = MONTH_YEAR.captures(raw) {
        return Some(format!("{}-{}-01", &caps[2], &caps[1]));
    }
    if YEAR.is_match(raw) {
        return Some(format!("{}-01-01", raw));
    }
    if ISO_DATE.is_match(raw) {
        return Some(raw.to_string());
    }
    None
}
