use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline phases, in execution order. `as_str` is the log step tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    DocumentCollection,
    Extraction,
    CacheLookup,
    HotelSearch,
    Persist,
    Notify,
}

/// Step tag for lifecycle entries (creation and status changes).
pub const JOB_STEP: &str = "job";

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::DocumentCollection => "document_collection",
            Phase::Extraction => "extraction",
            Phase::CacheLookup => "cache_lookup",
            Phase::HotelSearch => "hotel_search",
            Phase::Persist => "persist",
            Phase::Notify => "notify",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
