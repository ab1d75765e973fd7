//! Normalizer behavior on realistic upstream payloads.

use serde_json::json;

use sowpilot::normalize::{
    normalize_offer, normalize_requirements, NOT_AVAILABLE, UNKNOWN_HOTEL,
};

#[test]
fn test_nested_offer_name_is_recovered() {
    let raw = json!({
        "type": "hotel-offers",
        "offer": {"hotel": {"name": "Hyatt Regency Denver", "chainCode": "HY"}},
        "price": {"total": "412.50", "currency": "USD"}
    });
    let offer = normalize_offer(&raw);
    assert!(!offer.fallback_used);
    assert_eq!(offer.hotel_name, "Hyatt Regency Denver");
    assert_eq!(offer.name_path.as_deref(), Some("offer.hotel.name"));
    assert_eq!(offer.price_total, Some(412.5));
    assert_eq!(offer.price_currency.as_deref(), Some("USD"));
}

#[test]
fn test_sentinel_name_counts_as_missing() {
    let raw = json!({"a": {"b": {"c": {"name": "Unknown Hotel"}}}, "price": {"total": 99}});
    let offer = normalize_offer(&raw);
    assert!(offer.fallback_used);
    assert_eq!(offer.hotel_name, UNKNOWN_HOTEL);
    assert_eq!(offer.price_total, Some(99.0));
}

#[test]
fn test_loose_requirements_are_collected_from_anywhere() {
    let raw = json!({
        "event": {
            "venue": {"location": "Norfolk, VA"},
            "dates": {"startDate": "June 2, 2025", "endDate": "2025-06-05"}
        },
        "attendees": "120"
    });
    let normalized = normalize_requirements(&raw);
    assert!(!normalized.strict);
    assert!(!normalized.fallback_used);
    assert_eq!(normalized.requirements.location, "Norfolk, VA");
    assert_eq!(normalized.requirements.headcount, Some(120));
    assert_eq!(
        normalized.requirements.check_out.map(|d| d.to_string()).as_deref(),
        Some("2025-06-05")
    );
}

#[test]
fn test_missing_location_uses_sentinel() {
    let normalized = normalize_requirements(&json!({"headcount": 12, "location": "  "}));
    assert!(normalized.fallback_used);
    assert_eq!(normalized.requirements.location, NOT_AVAILABLE);
    assert!(normalized.missing.contains("location"));
    assert_eq!(normalized.requirements.headcount, Some(12));
}
