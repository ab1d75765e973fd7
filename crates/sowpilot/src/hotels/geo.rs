//! Location parsing, distance and room-count heuristics.

use std::sync::LazyLock;

use regex::Regex;

use super::model::Coordinates;

const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Fewest rooms a hotel needs for an event of `headcount` attendees:
/// two guests per room, never fewer than 10 rooms.
pub fn min_rooms(headcount: Option<u32>) -> u32 {
    (headcount.unwrap_or(0) / 2).max(10)
}

/// Great-circle distance in miles.
pub fn haversine_miles(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().min(1.0).asin()
}

static RE_ZIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\b\d{5}(?:-\d{4})?\s*$").unwrap());

/// City and optional state parsed from free-form location text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLocation {
    pub city: String,
    pub state: Option<String>,
}

fn is_country(segment: &str) -> bool {
    let bare: String = segment
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    matches!(bare.as_str(), "US" | "USA" | "UNITEDSTATES" | "UNITEDSTATESOFAMERICA")
}

/// Reads `"City, ST 12345"`: the first comma-separated segment is the city,
/// the next one the state. Country segments, anything after the state and
/// trailing ZIP codes are dropped.
pub fn parse_location(text: &str) -> ParsedLocation {
    let strip = |s: &str| RE_ZIP.replace(s.trim(), "").trim().to_string();

    let mut segments = text.split(',').map(strip);
    let city = segments.next().unwrap_or_default();
    let state = segments.find(|s| !s.is_empty() && !is_country(s));
    ParsedLocation { city, state }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_rooms() {
        assert_eq!(min_rooms(None), 10);
        assert_eq!(min_rooms(Some(0)), 10);
        assert_eq!(min_rooms(Some(17)), 10);
        assert_eq!(min_rooms(Some(30)), 15);
        assert_eq!(min_rooms(Some(42)), 21);
    }

    #[test]
    fn test_haversine() {
        let denver = Coordinates::new(39.7392, -104.9903);
        let boulder = Coordinates::new(40.0150, -105.2705);
        let d = haversine_miles(denver, boulder);
        assert!((d - 24.0).abs() < 1.0, "got {}", d);
        assert_eq!(haversine_miles(denver, denver), 0.0);
    }

    #[test]
    fn test_parse_location() {
        assert_eq!(
            parse_location("Denver, CO 80202"),
            ParsedLocation {
                city: "Denver".to_string(),
                state: Some("CO".to_string())
            }
        );
        assert_eq!(
            parse_location("  Washington, D.C. "),
            ParsedLocation {
                city: "Washington".to_string(),
                state: Some("D.C.".to_string())
            }
        );
        assert_eq!(
            parse_location("Fort Collins"),
            ParsedLocation {
                city: "Fort Collins".to_string(),
                state: None
            }
        );
        assert_eq!(parse_location("Tampa, ").state, None);
        assert_eq!(
            parse_location("Austin, TX 78701, USA"),
            ParsedLocation {
                city: "Austin".to_string(),
                state: Some("TX".to_string())
            }
        );
        assert_eq!(parse_location("Norfolk, Virginia, United States").state.as_deref(), Some("Virginia"));
        assert_eq!(parse_location("Boise, U.S.A.").state, None);
    }
}
