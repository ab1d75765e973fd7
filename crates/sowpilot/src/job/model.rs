use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Lifecycle status of an analysis job.
///
/// `Pending` and `Running` are the only non-terminal states; a job only ever
/// moves forward through `pending → running → {completed | failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Returns true if the transition from self to `target` is legal.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        match self {
            JobStatus::Pending => matches!(target, JobStatus::Running),
            JobStatus::Running => matches!(target, JobStatus::Completed | JobStatus::Failed),
            JobStatus::Completed | JobStatus::Failed => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// The kind of analysis a job performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// Extract structured requirements from the statement of work.
    SowExtraction,
    /// Extract requirements, then find and rank hotels for the event.
    HotelMatch,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown analysis type '{0}'")]
pub struct UnknownAnalysisType(pub String);

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::SowExtraction => "sow_extraction",
            AnalysisType::HotelMatch => "hotel_match",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = UnknownAnalysisType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sow_extraction" => Ok(AnalysisType::SowExtraction),
            "hotel_match" => Ok(AnalysisType::HotelMatch),
            other => Err(UnknownAnalysisType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid job status transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Durable record of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub id: String,
    /// Lookup key of the externally owned opportunity.
    pub opportunity_ref: String,
    pub analysis_type: AnalysisType,
    pub status: JobStatus,
    /// Raw options map as requested.
    pub options: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_payload: Option<Value>,
    #[serde(default)]
    pub artifact_paths: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    /// Creates a new pending job with a fresh id.
    pub fn new(opportunity_ref: &str, analysis_type: AnalysisType, options: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            opportunity_ref: opportunity_ref.to_string(),
            analysis_type,
            status: JobStatus::Pending,
            options,
            result_payload: None,
            artifact_paths: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the job to `target`, stamping `started_at`/`completed_at`.
    pub fn transition_to(&mut self, target: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(target) {
            return Err(InvalidTransition {
                from: self.status,
                to: target,
            });
        }

        let now = Utc::now();
        match target {
            JobStatus::Running => self.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed => self.completed_at = Some(now),
            JobStatus::Pending => {}
        }
        self.status = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_analysis_type_parse() {
        assert_eq!(
            "sow_extraction".parse::<AnalysisType>().unwrap(),
            AnalysisType::SowExtraction
        );
        assert_eq!(
            " hotel_match ".parse::<AnalysisType>().unwrap(),
            AnalysisType::HotelMatch
        );
        assert_eq!(
            "pricing".parse::<AnalysisType>().unwrap_err(),
            UnknownAnalysisType("pricing".to_string())
        );
    }

    #[test]
    fn test_status_transitions_only_move_forward() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Pending));
        for terminal in [Completed, Failed] {
            for target in [Pending, Running, Completed, Failed] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_transition_stamps_timestamps() {
        let mut job = AnalysisJob::new("opp-1", AnalysisType::HotelMatch, json!({}));
        assert!(job.started_at.is_none());

        job.transition_to(JobStatus::Running).unwrap();
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_none());

        job.transition_to(JobStatus::Completed).unwrap();
        assert!(job.completed_at.is_some());
        assert!(job.is_terminal());

        let err = job.transition_to(JobStatus::Running).unwrap_err();
        assert_eq!(err.from, JobStatus::Completed);
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn test_job_serializes_camel_case() {
        let job = AnalysisJob::new("opp-9", AnalysisType::SowExtraction, json!({"limit": 3}));
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["opportunityRef"], "opp-9");
        assert_eq!(value["analysisType"], "sow_extraction");
        assert_eq!(value["status"], "pending");
        assert!(value.get("resultPayload").is_none());
    }
}
