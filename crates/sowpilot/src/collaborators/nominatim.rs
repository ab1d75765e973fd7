//! Geocoding through an OpenStreetMap Nominatim `search` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use reqwest::Client;
use serde::Deserialize;

use super::http::{check_status, create_http_client, send_error};
use super::{CollaboratorError, Geocoder};
use crate::config::GeocodingConfig;
use crate::hotels::Coordinates;
use crate::ratelimit::RateLimiter;

const SERVICE: &str = "geocoder";

/// Memoized answers, misses included, so repeated candidates cost nothing.
const MEMO_CAPACITY: u64 = 10_000;
const MEMO_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

fn first_coordinates(places: &[Place]) -> Option<Coordinates> {
    places.iter().find_map(|p| {
        let lat = p.lat.parse::<f64>().ok()?;
        let lon = p.lon.parse::<f64>().ok()?;
        Some(Coordinates::new(lat, lon))
    })
}

fn memo_key(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Nominatim client paced by a shared [`RateLimiter`].
pub struct NominatimGeocoder {
    client: Client,
    search_url: String,
    limiter: RateLimiter,
    memo: Cache<String, Option<Coordinates>>,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: create_http_client(SERVICE, &config.user_agent)?,
            search_url: format!("{}/search", config.base_url.trim_end_matches('/')),
            limiter: RateLimiter::new(Duration::from_millis(config.min_interval_ms)),
            memo: Cache::builder()
                .max_capacity(MEMO_CAPACITY)
                .time_to_live(MEMO_TTL)
                .build(),
        })
    }

    async fn lookup(&self, query: &str) -> Result<Option<Coordinates>, CollaboratorError> {
        self.limiter.acquire().await;

        let response = self
            .client
            .get(&self.search_url)
            .query(&[("q", query), ("format", "jsonv2"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        let places: Vec<Place> = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse {
                service: SERVICE,
                reason: e.to_string(),
            })?;

        Ok(first_coordinates(&places))
    }
}

impl std::fmt::Debug for NominatimGeocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NominatimGeocoder")
            .field("search_url", &self.search_url)
            .field("interval", &self.limiter.interval())
            .field("memoized", &self.memo.entry_count())
            .finish()
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, CollaboratorError> {
        let key = memo_key(query);
        if key.is_empty() {
            return Ok(None);
        }
        if let Some(hit) = self.memo.get(&key) {
            return Ok(hit);
        }

        let result = self.lookup(query).await?;
        if result.is_none() {
            log::debug!("Geocoder has no match for '{}'", query);
        }
        // Errors are not memoized; only definitive answers are.
        self.memo.insert(key, result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> GeocodingConfig {
        GeocodingConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..GeocodingConfig::default()
        }
    }

    #[test]
    fn test_first_coordinates_skips_unparsable() {
        let places = vec![
            Place {
                lat: "n/a".to_string(),
                lon: "0".to_string(),
            },
            Place {
                lat: "39.7392".to_string(),
                lon: "-104.9903".to_string(),
            },
        ];
        assert_eq!(
            first_coordinates(&places),
            Some(Coordinates::new(39.7392, -104.9903))
        );
        assert_eq!(first_coordinates(&[]), None);
    }

    #[test]
    fn test_memo_key_normalizes_query() {
        assert_eq!(memo_key("  Denver,   CO "), "denver, co");
    }

    #[tokio::test]
    async fn test_memoized_answers_skip_the_network() {
        let geocoder = NominatimGeocoder::new(&unreachable_config()).unwrap();
        geocoder.memo.insert(
            "denver, co".to_string(),
            Some(Coordinates::new(39.7392, -104.9903)),
        );
        geocoder.memo.insert("atlantis".to_string(), None);

        assert_eq!(
            geocoder.geocode("Denver,  CO").await.unwrap(),
            Some(Coordinates::new(39.7392, -104.9903))
        );
        assert_eq!(geocoder.geocode("Atlantis").await.unwrap(), None);
        assert_eq!(geocoder.geocode("   ").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        let geocoder = NominatimGeocoder::new(&unreachable_config()).unwrap();
        let err = geocoder.geocode("Denver, CO").await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {}", err);
    }
}
