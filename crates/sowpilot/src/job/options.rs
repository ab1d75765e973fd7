//! Recognized job options.
//!
//! Options arrive as a free-form JSON map. Recognized keys are decoded here;
//! unknown keys stay in the job's raw options and are otherwise ignored.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("options must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("malformed options: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("check_out {check_out} is before check_in {check_in}")]
    InvertedDates {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },

    #[error("limit must be greater than zero")]
    ZeroLimit,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Check-in date override.
    #[serde(alias = "checkIn")]
    pub check_in: Option<NaiveDate>,
    /// Check-out date override.
    #[serde(alias = "checkOut")]
    pub check_out: Option<NaiveDate>,
    /// Event location override, e.g. "Denver, CO".
    pub location: Option<String>,
    /// Headcount override. `adults` is accepted too; when both are sent,
    /// `headcount` wins.
    pub headcount: Option<u32>,
    #[serde(skip_serializing)]
    adults: Option<u32>,
    /// Skip the decision cache lookup (the result is still saved).
    #[serde(alias = "forceRefresh")]
    pub force_refresh: bool,
    /// Maximum number of ranked hotels to keep.
    pub limit: Option<usize>,
    /// IATA city code for the hotel search provider.
    #[serde(alias = "cityCode")]
    pub city_code: Option<String>,
    /// Notification recipients in addition to the configured defaults.
    pub recipients: Vec<String>,
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl JobOptions {
    /// Decodes and validates an options map. `null` means "no options".
    pub fn from_value(value: &Value) -> Result<Self, OptionsError> {
        let mut options: JobOptions = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(_) => serde_json::from_value(value.clone())?,
            other => return Err(OptionsError::NotAnObject(kind_of(other))),
        };

        if let (Some(check_in), Some(check_out)) = (options.check_in, options.check_out) {
            if check_out < check_in {
                return Err(OptionsError::InvertedDates {
                    check_in,
                    check_out,
                });
            }
        }
        if options.limit == Some(0) {
            return Err(OptionsError::ZeroLimit);
        }
        let adults = options.adults.take();
        options.headcount = options.headcount.or(adults);

        Ok(options)
    }

    /// Location override with surrounding whitespace removed, if non-empty.
    pub fn location(&self) -> Option<&str> {
        self.location
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_default() {
        assert_eq!(JobOptions::from_value(&Value::Null).unwrap(), JobOptions::default());
    }

    #[test]
    fn test_recognized_keys_and_aliases() {
        let options = JobOptions::from_value(&json!({
            "checkIn": "2026-05-04",
            "check_out": "2026-05-07",
            "adults": 42,
            "forceRefresh": true,
            "location": "  Denver, CO ",
            "unrelated": {"kept": "raw"}
        }))
        .unwrap();

        assert_eq!(options.check_in, NaiveDate::from_ymd_opt(2026, 5, 4));
        assert_eq!(options.check_out, NaiveDate::from_ymd_opt(2026, 5, 7));
        assert_eq!(options.headcount, Some(42));
        assert!(options.force_refresh);
        assert_eq!(options.location(), Some("Denver, CO"));
    }

    #[test]
    fn test_headcount_and_adults_together() {
        let options = JobOptions::from_value(&json!({"adults": 30, "headcount": 24})).unwrap();
        assert_eq!(options.headcount, Some(24));

        let options = JobOptions::from_value(&json!({"adults": 30, "headcount": null})).unwrap();
        assert_eq!(options.headcount, Some(30));
        assert_eq!(serde_json::to_value(&options).unwrap()["headcount"], 30);
        assert!(serde_json::to_value(&options).unwrap().get("adults").is_none());
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        let err = JobOptions::from_value(&json!({"force_refresh": "yes"})).unwrap_err();
        assert!(matches!(err, OptionsError::Malformed(_)));

        let err = JobOptions::from_value(&json!({"check_in": "next tuesday"})).unwrap_err();
        assert!(matches!(err, OptionsError::Malformed(_)));

        let err = JobOptions::from_value(&json!(["a"])).unwrap_err();
        assert!(matches!(err, OptionsError::NotAnObject("an array")));
    }

    #[test]
    fn test_inverted_dates_rejected() {
        let err = JobOptions::from_value(&json!({
            "check_in": "2026-05-07",
            "check_out": "2026-05-04"
        }))
        .unwrap_err();
        assert!(matches!(err, OptionsError::InvertedDates { .. }));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = JobOptions::from_value(&json!({"limit": 0})).unwrap_err();
        assert!(matches!(err, OptionsError::ZeroLimit));
    }

    #[test]
    fn test_blank_location_is_none() {
        let options = JobOptions::from_value(&json!({"location": "   "})).unwrap();
        assert_eq!(options.location(), None);
    }
}
