//! Structured-result normalization.
//!
//! The extraction oracle and the hotel search provider return JSON whose
//! shape drifts: a hotel name may sit at the top level, under
//! `offer.hotel.name`, or under `offer.offer.hotel.name`. Every boundary
//! decode tries a strict schema first and only then falls back to a
//! depth-first search for the expected key. Nothing ambiguous leaks past
//! this module.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder for a hotel whose name could not be recovered.
pub const UNKNOWN_HOTEL: &str = "Unknown Hotel";
/// Placeholder for any other unrecoverable text field.
pub const NOT_AVAILABLE: &str = "N/A";

const SENTINELS: [&str; 2] = [UNKNOWN_HOTEL, NOT_AVAILABLE];

/// A field value located in a nested structure.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch<'a> {
    pub value: &'a Value,
    /// Dotted path, array positions as `[i]`, e.g. `offers[0].price.total`.
    pub path: String,
}

pub fn is_sentinel(text: &str) -> bool {
    let text = text.trim();
    SENTINELS.iter().any(|s| s.eq_ignore_ascii_case(text))
}

/// A scalar that carries information: non-empty, non-sentinel text, or any
/// number or boolean.
fn is_usable(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty() && !is_sentinel(s),
        Value::Number(_) | Value::Bool(_) => true,
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn search<'a>(value: &'a Value, keys: &[&str], path: &str) -> Option<FieldMatch<'a>> {
    match value {
        Value::Object(map) => {
            // An object's own fields win over anything nested below it.
            for key in keys {
                if let Some(found) = map.get(*key).filter(|v| is_usable(v)) {
                    return Some(FieldMatch {
                        value: found,
                        path: join(path, key),
                    });
                }
            }
            map.iter()
                .find_map(|(key, child)| search(child, keys, &join(path, key)))
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, child)| search(child, keys, &format!("{}[{}]", path, i))),
        _ => None,
    }
}

/// Depth-first search for the first usable value stored under `key`.
pub fn find_field<'a>(root: &'a Value, key: &str) -> Option<FieldMatch<'a>> {
    search(root, &[key], "")
}

/// Like [`find_field`], accepting any of `keys` (earlier keys win within
/// the same object).
pub fn find_any<'a>(root: &'a Value, keys: &[&str]) -> Option<FieldMatch<'a>> {
    search(root, keys, "")
}

/// Text field with sentinel substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedText {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub fallback_used: bool,
}

/// Finds a text field or substitutes `sentinel`, flagging the fallback.
pub fn text_field(root: &Value, keys: &[&str], sentinel: &str) -> NormalizedText {
    match find_any(root, keys) {
        Some(found) => NormalizedText {
            value: scalar_text(found.value),
            path: Some(found.path),
            fallback_used: false,
        },
        None => NormalizedText {
            value: sentinel.to_string(),
            path: None,
            fallback_used: true,
        },
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

fn as_count(value: &Value) -> Option<u32> {
    as_number(value)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n.round() as u32)
}

/// Accepts `YYYY-MM-DD` and anything that starts with it (date-times).
pub fn parse_day(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn as_date(value: &Value) -> Option<NaiveDate> {
    value.as_str().and_then(parse_day)
}

// ─── Requirements ───────────────────────────────────────────────────────────

const LOCATION_KEYS: [&str; 4] = ["location", "event_location", "eventLocation", "place_of_performance"];
const CHECK_IN_KEYS: [&str; 4] = ["check_in", "checkIn", "start_date", "startDate"];
const CHECK_OUT_KEYS: [&str; 4] = ["check_out", "checkOut", "end_date", "endDate"];
const HEADCOUNT_KEYS: [&str; 4] = ["headcount", "attendees", "adults", "attendee_count"];
const SUMMARY_KEYS: [&str; 2] = ["summary", "description"];

/// Structured requirements extracted from the statement of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    /// Event location, or [`NOT_AVAILABLE`].
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headcount: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Requirements {
    /// The event location, unless it is the sentinel.
    pub fn location(&self) -> Option<&str> {
        let location = self.location.trim();
        (!location.is_empty() && !is_sentinel(location)).then_some(location)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictRequirements {
    location: String,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
    headcount: Option<u32>,
    #[serde(default)]
    summary: Option<String>,
}

/// Requirements plus how they were recovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRequirements {
    pub requirements: Requirements,
    /// The raw value matched the strict schema.
    pub strict: bool,
    /// Fields that could not be found anywhere.
    pub missing: BTreeSet<String>,
    /// The location had to be replaced by the sentinel.
    pub fallback_used: bool,
}

pub fn normalize_requirements(raw: &Value) -> NormalizedRequirements {
    if let Ok(strict) = serde_json::from_value::<StrictRequirements>(raw.clone()) {
        if !strict.location.trim().is_empty() && !is_sentinel(&strict.location) {
            let requirements = Requirements {
                location: strict.location.trim().to_string(),
                check_in: strict.check_in,
                check_out: strict.check_out,
                headcount: strict.headcount,
                summary: strict.summary,
            };
            let missing = missing_fields(&requirements);
            return NormalizedRequirements {
                requirements,
                strict: true,
                missing,
                fallback_used: false,
            };
        }
    }

    let location = text_field(raw, &LOCATION_KEYS, NOT_AVAILABLE);
    let requirements = Requirements {
        location: location.value,
        check_in: find_any(raw, &CHECK_IN_KEYS).and_then(|m| as_date(m.value)),
        check_out: find_any(raw, &CHECK_OUT_KEYS).and_then(|m| as_date(m.value)),
        headcount: find_any(raw, &HEADCOUNT_KEYS).and_then(|m| as_count(m.value)),
        summary: find_any(raw, &SUMMARY_KEYS).map(|m| scalar_text(m.value)),
    };
    let missing = missing_fields(&requirements);
    NormalizedRequirements {
        requirements,
        strict: false,
        missing,
        fallback_used: location.fallback_used,
    }
}

fn missing_fields(requirements: &Requirements) -> BTreeSet<String> {
    let mut missing = BTreeSet::new();
    if requirements.location().is_none() {
        missing.insert("location".to_string());
    }
    if requirements.check_in.is_none() {
        missing.insert("check_in".to_string());
    }
    if requirements.check_out.is_none() {
        missing.insert("check_out".to_string());
    }
    if requirements.headcount.is_none() {
        missing.insert("headcount".to_string());
    }
    missing
}

// ─── Hotel offers ───────────────────────────────────────────────────────────

const NAME_KEYS: [&str; 3] = ["name", "hotel_name", "hotelName"];
const TOTAL_KEYS: [&str; 3] = ["total", "price_total", "priceTotal"];
const CURRENCY_KEYS: [&str; 2] = ["currency", "currencyCode"];

#[derive(Deserialize)]
struct StrictOffer {
    hotel: StrictHotel,
    offers: Vec<StrictRate>,
}

#[derive(Deserialize)]
struct StrictHotel {
    name: String,
}

#[derive(Deserialize)]
struct StrictRate {
    price: StrictPrice,
}

#[derive(Deserialize)]
struct StrictPrice {
    total: String,
    currency: String,
}

/// A priced hotel offer in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedOffer {
    /// Hotel name, or [`UNKNOWN_HOTEL`].
    pub hotel_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_currency: Option<String>,
    pub fallback_used: bool,
}

pub fn normalize_offer(raw: &Value) -> NormalizedOffer {
    if let Ok(strict) = serde_json::from_value::<StrictOffer>(raw.clone()) {
        let rate = strict.offers.first();
        let total = rate.and_then(|r| r.price.total.trim().parse::<f64>().ok());
        if !is_sentinel(&strict.hotel.name) && !strict.hotel.name.trim().is_empty() {
            return NormalizedOffer {
                hotel_name: strict.hotel.name.trim().to_string(),
                name_path: Some("hotel.name".to_string()),
                price_total: total,
                price_currency: rate.map(|r| r.price.currency.clone()),
                fallback_used: false,
            };
        }
    }

    let name = text_field(raw, &NAME_KEYS, UNKNOWN_HOTEL);
    NormalizedOffer {
        hotel_name: name.value,
        name_path: name.path,
        price_total: find_any(raw, &TOTAL_KEYS).and_then(|m| as_number(m.value)),
        price_currency: find_any(raw, &CURRENCY_KEYS).map(|m| scalar_text(m.value)),
        fallback_used: name.fallback_used,
    }
}
