//! Hotel Matching Engine.

pub mod directory;
pub mod engine;
pub mod geo;
pub mod model;

pub use directory::{HotelDirectory, JsonHotelDirectory};
pub use engine::{compare_results, rank_fallback, MatchingEngine};
pub use geo::{haversine_miles, min_rooms, parse_location, ParsedLocation};
pub use model::{Coordinates, Hotel, HotelMatchResult, Recommendation};
