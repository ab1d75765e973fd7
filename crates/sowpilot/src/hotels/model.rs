use serde::{Deserialize, Serialize};

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A hotel as listed in the external hotel directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Hotel {
    pub name: String,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Resolved lazily by the matching engine when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

impl Hotel {
    pub fn new(name: &str, city: &str, state: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            city: city.to_string(),
            state: state.map(str::to_string),
            address: None,
            room_count: None,
            rating: None,
            coordinates: None,
        }
    }
}

/// One ranked entry of a recommendation.
///
/// `distance_miles` is `None` when the hotel could not be geocoded (or the
/// ranking took the fallback path); it never means zero distance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HotelMatchResult {
    pub hotel: Hotel,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_miles: Option<f64>,
}

/// Ranked hotels plus how they were produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub hotels: Vec<HotelMatchResult>,
    /// True when the rating/room-count ranking was used instead of distances.
    pub fallback_used: bool,
    /// The ranking budget ran out before every candidate was placed.
    #[serde(default)]
    pub timed_out: bool,
    pub min_rooms: u32,
}
