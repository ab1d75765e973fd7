//! Shared fixtures for sowpilot integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use sowpilot::collaborators::{DocumentProvider, ExtractionOracle, Geocoder};
use sowpilot::db::Database;
use sowpilot::hotels::{Coordinates, Hotel, JsonHotelDirectory};
use sowpilot::store::{LogEntry, LogSink, ResultStore};
use sowpilot::testing::{StubDocuments, StubGeocoder, StubOracle};
use sowpilot::{AnalysisJob, Collaborators, JobStatus, Orchestrator};

pub const OPPORTUNITY: &str = "W912DY-25-R-0042";

pub const DENVER: Coordinates = Coordinates {
    lat: 39.7392,
    lon: -104.9903,
};

pub const SOW_TEXT: &str = "The contractor shall provide lodging for 30 attendees of the \
regional training event in Denver, CO from March 10 to March 12, 2025.";

pub fn extraction() -> Value {
    json!({
        "location": "Denver, CO",
        "check_in": "2025-03-10",
        "check_out": "2025-03-12",
        "headcount": 30
    })
}

pub fn hotel(name: &str, rooms: u32, rating: Option<f64>, address: Option<&str>) -> Hotel {
    Hotel {
        room_count: Some(rooms),
        rating,
        address: address.map(str::to_string),
        ..Hotel::new(name, "Denver", Some("CO"))
    }
}

/// Hotels the geocoder built by [`denver_geocoder`] can place.
pub fn denver_hotels() -> Vec<Hotel> {
    vec![
        hotel("Grand Hyatt", 500, Some(4.5), Some("1750 Welton St")),
        hotel("Hyatt Regency Denver", 1100, Some(4.4), Some("650 15th St")),
        hotel("Airport Inn", 60, Some(3.0), Some("8000 Pena Blvd")),
    ]
}

pub fn denver_geocoder() -> StubGeocoder {
    StubGeocoder::new()
        .with("Denver, CO", DENVER)
        .with("1750 Welton St", Coordinates::new(39.7455, -104.9886))
        .with("650 15th St", Coordinates::new(39.7430, -104.9950))
        .with("8000 Pena Blvd", Coordinates::new(39.8561, -104.6737))
}

/// Collaborators with every stub held by the caller for later inspection.
pub struct Stubs {
    pub documents: Arc<StubDocuments>,
    pub oracle: Arc<StubOracle>,
    pub geocoder: Arc<StubGeocoder>,
    pub hotels: Vec<Hotel>,
}

impl Stubs {
    pub fn new(documents: StubDocuments, oracle: StubOracle, geocoder: StubGeocoder) -> Self {
        Self {
            documents: Arc::new(documents),
            oracle: Arc::new(oracle),
            geocoder: Arc::new(geocoder),
            hotels: denver_hotels(),
        }
    }

    /// Documents, oracle and geocoder that all work.
    pub fn healthy() -> Self {
        Self::new(
            StubDocuments::text(SOW_TEXT),
            StubOracle::returning(extraction()),
            denver_geocoder(),
        )
    }

    pub fn with_hotels(mut self, hotels: Vec<Hotel>) -> Self {
        self.hotels = hotels;
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            documents: self.documents.clone() as Arc<dyn DocumentProvider>,
            oracle: self.oracle.clone() as Arc<dyn ExtractionOracle>,
            geocoder: self.geocoder.clone() as Arc<dyn Geocoder>,
            directory: Arc::new(JsonHotelDirectory::new(self.hotels.clone())),
            hotel_search: None,
        }
    }
}

pub fn database() -> Database {
    Database::open_in_memory().expect("in-memory database")
}

pub fn logs(orchestrator: &Orchestrator, job_id: &str) -> Vec<LogEntry> {
    orchestrator.logs().tail(job_id, None).expect("log tail")
}

/// Step tags in the order they first appear in the job's log.
pub fn steps(orchestrator: &Orchestrator, job_id: &str) -> Vec<String> {
    let mut steps: Vec<String> = Vec::new();
    for entry in logs(orchestrator, job_id) {
        if !steps.contains(&entry.step) {
            steps.push(entry.step);
        }
    }
    steps
}

pub fn hotel_names(job: &AnalysisJob) -> Vec<String> {
    job.result_payload.as_ref().expect("result payload")["hotels"]
        .as_array()
        .expect("hotels array")
        .iter()
        .map(|h| h["hotel"]["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

/// Polls the store until the job is terminal.
pub async fn wait_terminal(orchestrator: &Orchestrator, job_id: &str) -> AnalysisJob {
    for _ in 0..500 {
        let job = orchestrator
            .store()
            .get(job_id)
            .expect("store read")
            .expect("job exists");
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never reached a terminal status", job_id);
}

pub fn assert_status(job: &AnalysisJob, status: JobStatus) {
    assert_eq!(
        job.status, status,
        "unexpected status; payload: {:?}",
        job.result_payload
    );
}
