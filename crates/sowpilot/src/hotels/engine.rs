//! Geo-ranked hotel matching with a deterministic fallback ranking.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};

use super::directory::HotelDirectory;
use super::geo::{haversine_miles, min_rooms, parse_location};
use super::model::{Coordinates, Hotel, HotelMatchResult, Recommendation};
use crate::collaborators::{CollaboratorError, Geocoder};
use crate::ratelimit::{with_retry, with_timeout};

/// Ranks directory hotels around an event location.
#[derive(Clone)]
pub struct MatchingEngine {
    geocoder: Arc<dyn Geocoder>,
    directory: Arc<dyn HotelDirectory>,
    call_timeout: Duration,
    retry_backoff: Duration,
    ranking_budget: Duration,
}

/// Closer is better; unresolved distances score zero.
fn distance_score(distance_miles: Option<f64>) -> f64 {
    distance_miles.map_or(0.0, |d| 1.0 / (1.0 + d.max(0.0)))
}

/// Descending score, then resolved distances before unresolved ones, then
/// ascending distance.
pub fn compare_results(a: &HotelMatchResult, b: &HotelMatchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| match (a.distance_miles, b.distance_miles) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

/// Descending rating then descending room count, unknown values last.
fn compare_fallback(a: &Hotel, b: &Hotel) -> Ordering {
    fn desc<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Ordering {
        match (a, b) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
    desc(a.rating, b.rating).then_with(|| desc(a.room_count, b.room_count))
}

impl MatchingEngine {
    pub fn new(geocoder: Arc<dyn Geocoder>, directory: Arc<dyn HotelDirectory>) -> Self {
        Self {
            geocoder,
            directory,
            call_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(2),
            ranking_budget: Duration::from_secs(120),
        }
    }

    pub fn with_timeouts(mut self, call_timeout: Duration, retry_backoff: Duration) -> Self {
        self.call_timeout = call_timeout;
        self.retry_backoff = retry_backoff;
        self
    }

    /// Wall-clock limit for a whole [`recommend`](Self::recommend) call. Once
    /// spent, candidates not yet placed are ranked without distances.
    pub fn with_ranking_budget(mut self, budget: Duration) -> Self {
        self.ranking_budget = budget;
        self
    }

    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, CollaboratorError> {
        with_retry(self.retry_backoff, || {
            with_timeout("geocoder", self.call_timeout, self.geocoder.geocode(query))
        })
        .await
    }

    /// Coordinates of a candidate: its own, else the first geocoding hit of
    /// address, "city, state", then "name, city".
    async fn locate(&self, hotel: &Hotel) -> Option<Coordinates> {
        if hotel.coordinates.is_some() {
            return hotel.coordinates;
        }

        let mut queries = Vec::with_capacity(3);
        if let Some(address) = hotel.address.as_deref().filter(|a| !a.trim().is_empty()) {
            queries.push(address.to_string());
        }
        match hotel.state.as_deref() {
            Some(state) => queries.push(format!("{}, {}", hotel.city, state)),
            None => queries.push(hotel.city.clone()),
        }
        queries.push(format!("{}, {}", hotel.name, hotel.city));

        for query in &queries {
            match self.geocode(query).await {
                Ok(Some(coords)) => return Some(coords),
                Ok(None) => {}
                Err(e) => tracing::debug!("Geocoding '{}' failed: {}", query, e),
            }
        }
        None
    }

    /// Ranked hotels for an event at `location_text`.
    ///
    /// A geocoding miss or failure for the event location switches to the
    /// fallback ranking; an error is only returned when the directory
    /// itself cannot be queried.
    pub async fn recommend(
        &self,
        location_text: &str,
        headcount: Option<u32>,
        limit: usize,
    ) -> Result<Recommendation, CollaboratorError> {
        let deadline = Instant::now() + self.ranking_budget;
        let place = parse_location(location_text);
        let min_rooms = min_rooms(headcount);

        let origin = match self.geocode(location_text).await {
            Ok(origin) => origin,
            Err(e) => {
                tracing::warn!("Geocoding event location '{}' failed: {}", location_text, e);
                None
            }
        };

        let candidates = with_retry(self.retry_backoff, || {
            with_timeout(
                "hotel directory",
                self.call_timeout,
                self.directory
                    .candidates(&place.city, place.state.as_deref(), min_rooms),
            )
        })
        .await?;

        tracing::debug!(
            city = %place.city,
            state = ?place.state,
            min_rooms,
            candidates = candidates.len(),
            "Hotel candidates fetched"
        );

        let mut timed_out = false;
        let (mut hotels, fallback_used) = match origin {
            Some(origin) => {
                let ranking = self.rank_by_distance(origin, candidates.clone());
                match timeout_at(deadline, ranking).await {
                    Ok(hotels) => (hotels, false),
                    Err(_) => {
                        tracing::warn!(
                            budget = ?self.ranking_budget,
                            candidates = candidates.len(),
                            "Geo-ranking ran out of time; using fallback ranking"
                        );
                        timed_out = true;
                        (rank_fallback(candidates), true)
                    }
                }
            }
            None => (rank_fallback(candidates), true),
        };
        hotels.truncate(limit);

        Ok(Recommendation {
            hotels,
            fallback_used,
            timed_out,
            min_rooms,
        })
    }

    async fn rank_by_distance(
        &self,
        origin: Coordinates,
        candidates: Vec<Hotel>,
    ) -> Vec<HotelMatchResult> {
        let mut results = Vec::with_capacity(candidates.len());
        for mut hotel in candidates {
            let coords = self.locate(&hotel).await;
            hotel.coordinates = coords;
            let distance_miles = coords.map(|c| haversine_miles(origin, c));
            results.push(HotelMatchResult {
                hotel,
                score: distance_score(distance_miles),
                price_total: None,
                price_currency: None,
                distance_miles,
            });
        }
        results.sort_by(compare_results);
        results
    }
}

/// Fallback ranking without distances. Hotels that compare equal share a
/// score, so the score sequence follows the ranking exactly.
pub fn rank_fallback(mut candidates: Vec<Hotel>) -> Vec<HotelMatchResult> {
    candidates.sort_by(compare_fallback);

    let mut rank = 0usize;
    let mut results: Vec<HotelMatchResult> = Vec::with_capacity(candidates.len());
    for hotel in candidates {
        if let Some(prev) = results.last() {
            if compare_fallback(&prev.hotel, &hotel) != Ordering::Equal {
                rank += 1;
            }
        }
        results.push(HotelMatchResult {
            hotel,
            score: 1.0 / (1.0 + rank as f64),
            price_total: None,
            price_currency: None,
            distance_miles: None,
        });
    }
    results
}

impl std::fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("call_timeout", &self.call_timeout)
            .field("retry_backoff", &self.retry_backoff)
            .finish_non_exhaustive()
    }
}
