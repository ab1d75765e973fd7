//! Canonical, order-independent fingerprints of cache contexts.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// The canonical form of a context and its SHA-256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Sorted `key=value` lines.
    pub canonical: String,
    /// Lowercase hex digest of `canonical`.
    pub key_hash: String,
}

impl Fingerprint {
    /// Normalizes `context` and hashes it.
    ///
    /// Nested keys are flattened to dotted paths. Keys and strings are
    /// trimmed and lowercased, inner whitespace is collapsed, dates and
    /// date-times are reduced to the day, integral floats lose their
    /// fraction, arrays are sorted, and null or empty values are dropped.
    pub fn of(context: &Value) -> Self {
        let mut pairs = Vec::new();
        flatten(context, "", &mut pairs);
        pairs.sort();
        pairs.dedup();

        let canonical = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let key_hash = format!("{:x}", hasher.finalize());

        Self {
            canonical,
            key_hash,
        }
    }

    /// One-line human readable form, used as the default pattern description.
    pub fn describe(&self) -> String {
        if self.canonical.is_empty() {
            "(empty context)".to_string()
        } else {
            self.canonical.replace('\n', "; ")
        }
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

const LOCAL_DATE_TIMES: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// The calendar day of text that is entirely a date or a date-time. Text
/// that merely starts with a date is not a day.
fn calendar_day(text: &str) -> Option<NaiveDate> {
    if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(day);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Some(stamp.date_naive());
    }
    LOCAL_DATE_TIMES
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|stamp| stamp.date())
}

fn normalize_text(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if let Some(day) = calendar_day(&collapsed) {
        return Some(day.format("%Y-%m-%d").to_string());
    }
    Some(collapsed.to_lowercase())
}

fn normalize_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                Some(format!("{}", f as i64))
            }
            _ => Some(n.to_string()),
        },
        Value::String(s) => normalize_text(s),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Canonical single-string form of any value, for sorting array elements.
fn canonical_value(value: &Value) -> Option<String> {
    match value {
        Value::Object(_) | Value::Array(_) => {
            let mut pairs = Vec::new();
            flatten(value, "", &mut pairs);
            if pairs.is_empty() {
                return None;
            }
            pairs.sort();
            let inner = pairs
                .iter()
                .map(|(k, v)| if k.is_empty() { v.clone() } else { format!("{}={}", k, v) })
                .collect::<Vec<_>>()
                .join(",");
            Some(format!("{{{}}}", inner))
        }
        scalar => normalize_scalar(scalar),
    }
}

fn flatten(value: &Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let key = normalize_key(key);
                if key.is_empty() {
                    continue;
                }
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(child, &path, out);
            }
        }
        Value::Array(items) => {
            let mut elements: Vec<String> = items.iter().filter_map(canonical_value).collect();
            if elements.is_empty() {
                return;
            }
            elements.sort();
            out.push((prefix.to_string(), format!("[{}]", elements.join(","))));
        }
        scalar => {
            if let Some(v) = normalize_scalar(scalar) {
                out.push((prefix.to_string(), v));
            }
        }
    }
}

/// The context a `hotel_match` run caches under.
pub fn hotel_request_context(
    location: &str,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
    headcount: Option<u32>,
) -> Value {
    let mut context = Map::new();
    context.insert("location".to_string(), json!(location));
    if let Some(day) = check_in {
        context.insert("check_in".to_string(), json!(day));
    }
    if let Some(day) = check_out {
        context.insert("check_out".to_string(), json!(day));
    }
    if let Some(count) = headcount {
        context.insert("headcount".to_string(), json!(count));
    }
    Value::Object(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_whitespace_insensitive() {
        let a = Fingerprint::of(&json!({
            "location": "Denver, CO",
            "check_in": "2025-03-10",
            "headcount": 40
        }));
        let b = Fingerprint::of(&json!({
            " Headcount ": 40.0,
            "LOCATION": "  denver,   co ",
            "check_in": "2025-03-10T09:30:00Z"
        }));
        assert_eq!(a.key_hash, b.key_hash);
        assert_eq!(a.key_hash.len(), 64);
    }

    #[test]
    fn test_empty_fields_are_dropped() {
        let a = Fingerprint::of(&json!({"location": "Tampa, FL"}));
        let b = Fingerprint::of(&json!({
            "location": "Tampa, FL",
            "notes": "",
            "city_code": null,
            "tags": [],
            "extra": {}
        }));
        assert_eq!(a, b);
    }

    #[test]
    fn test_only_whole_dates_collapse_to_the_day() {
        let denver = Fingerprint::of(&json!({"event": "2025-03-10 Denver kickoff"}));
        let tampa = Fingerprint::of(&json!({"event": "2025-03-10 Tampa kickoff"}));
        assert_ne!(denver.key_hash, tampa.key_hash);
        assert_eq!(denver.canonical, "event=2025-03-10 denver kickoff");

        for stamp in ["2025-03-10 14:00", "2025-03-10T14:00:00.250", "2025-03-10T23:30:00-07:00"] {
            assert_eq!(
                Fingerprint::of(&json!({"check_in": stamp})).canonical,
                "check_in=2025-03-10",
                "{}",
                stamp
            );
        }
    }

    #[test]
    fn test_arrays_are_order_independent() {
        let a = Fingerprint::of(&json!({"amenities": ["Parking", "wifi"]}));
        let b = Fingerprint::of(&json!({"amenities": ["WiFi ", "parking"]}));
        assert_eq!(a.key_hash, b.key_hash);
    }

    #[test]
    fn test_different_requests_differ() {
        let a = Fingerprint::of(&json!({"location": "Denver, CO", "headcount": 40}));
        let b = Fingerprint::of(&json!({"location": "Denver, CO", "headcount": 41}));
        assert_ne!(a.key_hash, b.key_hash);
    }

    #[test]
    fn test_nested_keys_flatten() {
        let fp = Fingerprint::of(&json!({"event": {"Location": "Austin, TX"}}));
        assert_eq!(fp.canonical, "event.location=austin, tx");
        assert_eq!(fp.describe(), "event.location=austin, tx");
    }

    #[test]
    fn test_hotel_request_context() {
        let ctx = hotel_request_context(
            "Denver, CO",
            NaiveDate::from_ymd_opt(2025, 3, 10),
            None,
            Some(40),
        );
        assert_eq!(
            ctx,
            json!({"location": "Denver, CO", "check_in": "2025-03-10", "headcount": 40})
        );
    }
}
