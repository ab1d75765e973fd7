//! In-memory collaborators for tests.
//!
//! Compiled for this crate's own tests and, with the `testing` feature, for
//! downstream crates that drive an [`Orchestrator`] without network access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::{DecisionCache, SqliteCacheStore};
use crate::collaborators::{
    CollaboratorError, Document, DocumentProvider, ExtractionOracle, Geocoder,
    HotelSearchProvider, Notification, Notifier, OfferQuery,
};
use crate::db::Database;
use crate::hotels::{Coordinates, Hotel, JsonHotelDirectory};
use crate::pipeline::{Collaborators, Orchestrator, OrchestratorSettings};
use crate::store::{SqliteLogSink, SqliteResultStore};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn outage(service: &'static str) -> CollaboratorError {
    CollaboratorError::Unavailable {
        service,
        reason: "connection refused".to_string(),
    }
}

/// Geocoder answering from a fixed table; every other query is a miss.
#[derive(Debug, Default)]
pub struct StubGeocoder {
    places: HashMap<String, Coordinates>,
    failing: bool,
    latency: Duration,
    queries: Mutex<Vec<String>>,
}

impl StubGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A geocoder whose every call fails with `Unavailable`.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Every answer arrives after `latency` of tokio time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with(mut self, query: &str, coordinates: Coordinates) -> Self {
        self.places.insert(query.to_string(), coordinates);
        self
    }

    /// Every query received, in call order.
    pub fn queries(&self) -> Vec<String> {
        locked(&self.queries).clone()
    }
}

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, CollaboratorError> {
        locked(&self.queries).push(query.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing {
            return Err(outage("geocoder"));
        }
        Ok(self.places.get(query).copied())
    }
}

/// Document provider serving the same documents for every opportunity.
#[derive(Debug, Default)]
pub struct StubDocuments {
    documents: Vec<Document>,
    failing: bool,
    calls: AtomicUsize,
}

impl StubDocuments {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            ..Self::default()
        }
    }

    /// A single plain-text statement of work.
    pub fn text(body: &str) -> Self {
        Self::new(vec![Document::new("sow.txt", "text/plain", body.as_bytes())])
    }

    /// A provider that is down.
    pub fn outage() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentProvider for StubDocuments {
    async fn documents(&self, _opportunity_ref: &str) -> Result<Vec<Document>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(outage("document provider"));
        }
        Ok(self.documents.clone())
    }
}

/// Oracle returning a canned value regardless of input.
#[derive(Debug, Default)]
pub struct StubOracle {
    response: Value,
    failing: bool,
    calls: AtomicUsize,
}

impl StubOracle {
    pub fn returning(response: Value) -> Self {
        Self {
            response,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionOracle for StubOracle {
    async fn extract(&self, _text: &str, _instructions: &str) -> Result<Value, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(outage("extraction oracle"));
        }
        Ok(self.response.clone())
    }
}

/// Hotel offer search with canned offers.
#[derive(Debug, Default)]
pub struct StubHotelSearch {
    offers: Vec<Value>,
    rate_limited: bool,
    queries: Mutex<Vec<OfferQuery>>,
}

impl StubHotelSearch {
    pub fn returning(offers: Vec<Value>) -> Self {
        Self {
            offers,
            ..Self::default()
        }
    }

    /// A provider that answers every call with a 429.
    pub fn rate_limited() -> Self {
        Self {
            rate_limited: true,
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<OfferQuery> {
        locked(&self.queries).clone()
    }
}

#[async_trait]
impl HotelSearchProvider for StubHotelSearch {
    async fn search_offers(&self, query: &OfferQuery) -> Result<Vec<Value>, CollaboratorError> {
        locked(&self.queries).push(query.clone());
        if self.rate_limited {
            return Err(CollaboratorError::RateLimited {
                service: "hotel search",
                retry_after: Some(Duration::ZERO),
            });
        }
        Ok(self.offers.clone())
    }
}

/// Notifier that keeps every notification it is handed.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<Notification>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn delivered(&self) -> Vec<Notification> {
        locked(&self.delivered).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        if self.failing {
            return Err(outage("notifier"));
        }
        locked(&self.delivered).push(notification.clone());
        Ok(())
    }
}

/// Directory-backed collaborators with a geocoder that never resolves and
/// an oracle that returns `extraction`.
pub fn collaborators(
    documents: StubDocuments,
    extraction: Value,
    hotels: Vec<Hotel>,
) -> Collaborators {
    Collaborators {
        documents: Arc::new(documents),
        oracle: Arc::new(StubOracle::returning(extraction)),
        geocoder: Arc::new(StubGeocoder::new()),
        directory: Arc::new(JsonHotelDirectory::new(hotels)),
        hotel_search: None,
    }
}

/// Settings with no retry delay and a short call budget.
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        phase_timeout: Duration::from_secs(5),
        retry_backoff: Duration::ZERO,
        ..OrchestratorSettings::default()
    }
}

/// An orchestrator whose stores and cache all live in `db`.
pub fn orchestrator(db: &Database, collaborators: Collaborators) -> Orchestrator {
    orchestrator_with(db, collaborators, fast_settings())
}

pub fn orchestrator_with(
    db: &Database,
    collaborators: Collaborators,
    settings: OrchestratorSettings,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(SqliteResultStore::new(db.clone())),
        Arc::new(SqliteLogSink::new(db.clone())),
        DecisionCache::new(Arc::new(SqliteCacheStore::new(db.clone()))),
        collaborators,
        settings,
    )
}
