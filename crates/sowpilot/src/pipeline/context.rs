use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::hotel_request_context;
use crate::job::{AnalysisJob, JobOptions};
use crate::normalize::{NormalizedRequirements, Requirements};
use crate::store::JobLogger;

/// What a hotel search is keyed on: extracted requirements with the job's
/// overrides applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headcount: Option<u32>,
}

impl EventProfile {
    /// Overrides only. Known when the job itself names a location.
    pub fn from_options(options: &JobOptions) -> Self {
        Self::from_requirements(&Requirements::default(), options)
    }

    pub fn from_requirements(requirements: &Requirements, options: &JobOptions) -> Self {
        Self {
            location: options
                .location()
                .or_else(|| requirements.location())
                .map(str::to_string),
            check_in: options.check_in.or(requirements.check_in),
            check_out: options.check_out.or(requirements.check_out),
            headcount: options.headcount.or(requirements.headcount),
        }
    }

    /// Fills fields this profile lacks from `other`.
    pub fn fill_from(self, other: &EventProfile) -> Self {
        Self {
            location: self.location.or_else(|| other.location.clone()),
            check_in: self.check_in.or(other.check_in),
            check_out: self.check_out.or(other.check_out),
            headcount: self.headcount.or(other.headcount),
        }
    }

    pub fn is_known(&self) -> bool {
        self.location.is_some()
    }

    /// The decision cache context, or `None` without a location.
    pub fn cache_context(&self) -> Option<Value> {
        self.location.as_deref().map(|location| {
            hotel_request_context(location, self.check_in, self.check_out, self.headcount)
        })
    }
}

/// Mutable state of one job run, filled in phase by phase.
pub struct RunContext {
    pub job: AnalysisJob,
    pub options: JobOptions,
    pub log: JobLogger,

    // document_collection
    pub document_names: Vec<String>,
    pub document_text: String,

    // extraction
    pub extraction: Option<NormalizedRequirements>,

    // cache_lookup
    pub cache_key: Option<String>,
    pub cache_hit: bool,
    pub cache_bypassed: bool,

    /// Set by any degraded phase.
    pub fallback_used: bool,
    /// Human-readable notes on every degradation, in order.
    pub degradations: Vec<String>,
}

impl RunContext {
    pub fn new(job: AnalysisJob, options: JobOptions, log: JobLogger) -> Self {
        Self {
            job,
            options,
            log,
            document_names: Vec::new(),
            document_text: String::new(),
            extraction: None,
            cache_key: None,
            cache_hit: false,
            cache_bypassed: false,
            fallback_used: false,
            degradations: Vec::new(),
        }
    }

    /// Records a degraded outcome: WARNING entry plus the fallback flag.
    pub fn degrade(&mut self, step: &str, message: impl Into<String>) {
        let message = message.into();
        self.log.warn(step, message.clone());
        self.fallback_used = true;
        self.degradations.push(message);
    }

    pub fn requirements(&self) -> Requirements {
        self.extraction
            .as_ref()
            .map(|e| e.requirements.clone())
            .unwrap_or_default()
    }

    pub fn profile(&self) -> EventProfile {
        EventProfile::from_requirements(&self.requirements(), &self.options)
    }
}
