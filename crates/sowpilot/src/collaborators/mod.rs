//! Contracts for the external collaborators the pipeline calls, plus their
//! HTTP and filesystem implementations.
//!
//! Each collaborator is handed to the orchestrator as an `Arc<dyn Trait>`;
//! nothing here is looked up from process-wide state.

use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::hotels::Coordinates;
use crate::job::{AnalysisType, JobStatus};

pub mod amadeus;
pub mod documents;
pub mod http;
pub mod nominatim;
pub mod notify;
pub mod oracle;

pub use amadeus::AmadeusHotelSearch;
pub use documents::FilesystemDocumentProvider;
pub use nominatim::NominatimGeocoder;
pub use notify::{LogNotifier, WebhookNotifier};
pub use oracle::OpenAiExtractionOracle;

#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    #[error("{service} rate limited the request")]
    RateLimited {
        service: &'static str,
        retry_after: Option<Duration>,
    },

    #[error("{service} timed out after {}s", after.as_secs_f32())]
    Timeout {
        service: &'static str,
        after: Duration,
    },

    #[error("{service} rejected the request ({status}): {body}")]
    Rejected {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned an invalid response: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CollaboratorError {
    /// Transient failures are worth one retry after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Unavailable { .. }
                | CollaboratorError::RateLimited { .. }
                | CollaboratorError::Timeout { .. }
        )
    }
}

/// An already-downloaded opportunity document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: &str, mime_type: &str, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            bytes: bytes.into(),
        }
    }

    pub fn is_textual(&self) -> bool {
        let mime = self.mime_type.as_str();
        mime.starts_with("text/")
            || matches!(
                mime,
                "application/json" | "application/xml" | "application/x-yaml"
            )
    }

    /// Document text, or `None` for binary formats the core does not parse.
    pub fn text(&self) -> Option<Cow<'_, str>> {
        self.is_textual()
            .then(|| String::from_utf8_lossy(&self.bytes))
    }
}

/// Hotel offer search parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferQuery {
    pub city_code: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub adults: u32,
}

/// A rendered job report addressed to its recipients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub job_id: String,
    pub opportunity_ref: String,
    pub analysis_type: AnalysisType,
    pub status: JobStatus,
    pub recipients: Vec<String>,
    pub subject: String,
    /// Markdown report body.
    pub report: String,
}

#[async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn documents(&self, opportunity_ref: &str) -> Result<Vec<Document>, CollaboratorError>;
}

/// Turns document text into a loosely structured JSON value.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    async fn extract(&self, text: &str, instructions: &str) -> Result<Value, CollaboratorError>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` is a miss: the provider answered but knows no such place.
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>, CollaboratorError>;
}

/// Returns raw, structurally ambiguous offers.
#[async_trait]
pub trait HotelSearchProvider: Send + Sync {
    async fn search_offers(&self, query: &OfferQuery) -> Result<Vec<Value>, CollaboratorError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError>;
}
