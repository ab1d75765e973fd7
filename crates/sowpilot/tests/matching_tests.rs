//! Hotel ranking through the public engine API.

mod common;

use std::sync::Arc;

use common::*;
use sowpilot::hotels::{compare_results, min_rooms, JsonHotelDirectory};
use sowpilot::testing::StubGeocoder;
use sowpilot::MatchingEngine;

fn engine(geocoder: StubGeocoder, hotels: Vec<sowpilot::hotels::Hotel>) -> MatchingEngine {
    MatchingEngine::new(Arc::new(geocoder), Arc::new(JsonHotelDirectory::new(hotels)))
        .with_timeouts(std::time::Duration::from_secs(5), std::time::Duration::ZERO)
}

#[test]
fn test_min_rooms_floor() {
    assert_eq!(min_rooms(Some(0)), 10);
    assert_eq!(min_rooms(None), 10);
    assert_eq!(min_rooms(Some(17)), 10);
    assert_eq!(min_rooms(Some(42)), 21);
}

#[tokio::test]
async fn test_results_are_sorted_by_score_then_distance() {
    let mut hotels = denver_hotels();
    let mut unplaced = hotel("Nowhere Lodge", 200, Some(5.0), Some("1 Unknown Rd"));
    unplaced.state = None;
    hotels.push(unplaced);
    let recommendation = engine(denver_geocoder(), hotels)
        .recommend("Denver, CO", Some(30), 10)
        .await
        .unwrap();

    assert!(!recommendation.fallback_used);
    assert_eq!(recommendation.min_rooms, 15);
    let names: Vec<&str> = recommendation
        .hotels
        .iter()
        .map(|r| r.hotel.name.as_str())
        .collect();
    assert_eq!(names[0], "Hyatt Regency Denver");
    assert_eq!(names[1], "Grand Hyatt");
    assert_eq!(names[3], "Nowhere Lodge");
    assert!(recommendation.hotels[3].distance_miles.is_none());

    for pair in recommendation.hotels.windows(2) {
        assert_ne!(
            compare_results(&pair[0], &pair[1]),
            std::cmp::Ordering::Greater
        );
    }
    for result in &recommendation.hotels {
        if let Some(distance) = result.distance_miles {
            assert!(distance >= 0.0);
        }
    }
}

#[tokio::test]
async fn test_small_and_unknown_hotels_are_excluded() {
    let mut unknown = hotel("Mystery Motel", 500, None, None);
    unknown.room_count = None;
    let hotels = vec![
        hotel("Forty Rooms", 40, None, None),
        hotel("Twenty Rooms", 20, None, None),
        unknown,
    ];
    let recommendation = engine(StubGeocoder::new(), hotels)
        .recommend("Denver, CO", Some(42), 10)
        .await
        .unwrap();

    assert!(recommendation.fallback_used);
    assert_eq!(recommendation.min_rooms, 21);
    let names: Vec<&str> = recommendation
        .hotels
        .iter()
        .map(|r| r.hotel.name.as_str())
        .collect();
    assert_eq!(names, ["Forty Rooms"]);
}

#[tokio::test]
async fn test_limit_truncates() {
    let recommendation = engine(denver_geocoder(), denver_hotels())
        .recommend("Denver, CO", None, 1)
        .await
        .unwrap();
    assert_eq!(recommendation.hotels.len(), 1);
    assert_eq!(recommendation.hotels[0].hotel.name, "Hyatt Regency Denver");
}

#[tokio::test]
async fn test_location_with_country_suffix_finds_candidates() {
    let geocoder = denver_geocoder().with("Denver, CO, USA", DENVER);
    let recommendation = engine(geocoder, denver_hotels())
        .recommend("Denver, CO, USA", Some(30), 10)
        .await
        .unwrap();

    assert!(!recommendation.fallback_used);
    assert_eq!(recommendation.hotels.len(), 3);
    assert_eq!(recommendation.hotels[0].hotel.name, "Hyatt Regency Denver");
}
