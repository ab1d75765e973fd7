//! Result Store: durable record of each analysis job.

use serde_json::Value;

use super::StoreError;
use crate::db::job_repo::{self, JobRow};
use crate::db::{format_timestamp, parse_timestamp, Database};
use crate::job::{AnalysisJob, AnalysisType, JobStatus};

/// Durable job records shared by all running jobs.
///
/// `save` only ever succeeds for a job whose stored status is still
/// non-terminal, so a completed or failed record is read-only.
pub trait ResultStore: Send + Sync {
    /// Inserts a freshly created job.
    fn create(&self, job: &AnalysisJob) -> Result<(), StoreError>;

    /// Replaces the mutable fields of a non-terminal job.
    fn save(&self, job: &AnalysisJob) -> Result<(), StoreError>;

    fn get(&self, id: &str) -> Result<Option<AnalysisJob>, StoreError>;

    /// The most recent completed job for an opportunity and analysis type.
    fn latest_completed(
        &self,
        opportunity_ref: &str,
        analysis_type: AnalysisType,
    ) -> Result<Option<AnalysisJob>, StoreError>;
}

/// [`ResultStore`] backed by the `analysis_jobs` table.
#[derive(Debug, Clone)]
pub struct SqliteResultStore {
    db: Database,
}

impl SqliteResultStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Number of jobs currently in `status`.
    pub fn count(&self, status: JobStatus) -> Result<u64, StoreError> {
        Ok(job_repo::count_by_status(&self.db, status.as_str())?)
    }
}

fn to_row(job: &AnalysisJob) -> Result<JobRow, StoreError> {
    Ok(JobRow {
        id: job.id.clone(),
        opportunity_ref: job.opportunity_ref.clone(),
        analysis_type: job.analysis_type.as_str().to_string(),
        status: job.status.as_str().to_string(),
        options: encode(&job.id, &job.options)?,
        result_json: job
            .result_payload
            .as_ref()
            .map(|v| encode(&job.id, v))
            .transpose()?,
        artifact_paths: encode(&job.id, &job.artifact_paths)?,
        created_at: format_timestamp(job.created_at),
        started_at: job.started_at.map(format_timestamp),
        completed_at: job.completed_at.map(format_timestamp),
    })
}

fn from_row(row: JobRow) -> Result<AnalysisJob, StoreError> {
    let analysis_type = row
        .analysis_type
        .parse::<AnalysisType>()
        .map_err(|e| corrupt(&row.id, e))?;
    let status = row
        .status
        .parse::<JobStatus>()
        .map_err(|e| corrupt(&row.id, e))?;
    let options: Value = serde_json::from_str(&row.options).map_err(|e| corrupt(&row.id, e))?;
    let result_payload = row
        .result_json
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()
        .map_err(|e| corrupt(&row.id, e))?;
    let artifact_paths: Vec<String> =
        serde_json::from_str(&row.artifact_paths).map_err(|e| corrupt(&row.id, e))?;

    Ok(AnalysisJob {
        opportunity_ref: row.opportunity_ref,
        analysis_type,
        status,
        options,
        result_payload,
        artifact_paths,
        created_at: parse_timestamp(&row.created_at),
        started_at: row.started_at.as_deref().map(parse_timestamp),
        completed_at: row.completed_at.as_deref().map(parse_timestamp),
        id: row.id,
    })
}

fn corrupt(id: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

fn encode<T: serde::Serialize>(id: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| corrupt(id, e))
}

impl ResultStore for SqliteResultStore {
    fn create(&self, job: &AnalysisJob) -> Result<(), StoreError> {
        job_repo::insert(&self.db, &to_row(job)?)?;
        log::debug!("Created job {} ({})", job.id, job.analysis_type);
        Ok(())
    }

    fn save(&self, job: &AnalysisJob) -> Result<(), StoreError> {
        if !job_repo::update_if_active(&self.db, &to_row(job)?)? {
            return Err(StoreError::NotWritable(job.id.clone()));
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<AnalysisJob>, StoreError> {
        job_repo::find_by_id(&self.db, id)?.map(from_row).transpose()
    }

    fn latest_completed(
        &self,
        opportunity_ref: &str,
        analysis_type: AnalysisType,
    ) -> Result<Option<AnalysisJob>, StoreError> {
        job_repo::find_latest(
            &self.db,
            opportunity_ref,
            analysis_type.as_str(),
            JobStatus::Completed.as_str(),
        )?
        .map(from_row)
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SqliteResultStore {
        SqliteResultStore::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_create_and_get_roundtrip() {
        let store = store();
        let job = AnalysisJob::new("opp-9", AnalysisType::HotelMatch, json!({"limit": 3}));
        store.create(&job).unwrap();

        let loaded = store.get(&job.id).unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.options, json!({"limit": 3}));
        assert!(loaded.result_payload.is_none());
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_terminal_job_is_read_only() {
        let store = store();
        let mut job = AnalysisJob::new("opp-9", AnalysisType::SowExtraction, Value::Null);
        store.create(&job).unwrap();

        job.transition_to(JobStatus::Running).unwrap();
        store.save(&job).unwrap();
        job.result_payload = Some(json!({"requirements": {}}));
        job.transition_to(JobStatus::Completed).unwrap();
        store.save(&job).unwrap();

        job.result_payload = Some(json!({"overwritten": true}));
        let err = store.save(&job).unwrap_err();
        assert!(matches!(err, StoreError::NotWritable(id) if id == job.id));

        let loaded = store.get(&job.id).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.result_payload, Some(json!({"requirements": {}})));
        assert!(loaded.started_at.is_some());
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn test_latest_completed_ignores_other_statuses() {
        let store = store();
        let mut done = AnalysisJob::new("opp-1", AnalysisType::SowExtraction, Value::Null);
        store.create(&done).unwrap();
        done.transition_to(JobStatus::Running).unwrap();
        done.transition_to(JobStatus::Completed).unwrap();
        store.save(&done).unwrap();

        let pending = AnalysisJob::new("opp-1", AnalysisType::SowExtraction, Value::Null);
        store.create(&pending).unwrap();

        let latest = store
            .latest_completed("opp-1", AnalysisType::SowExtraction)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, done.id);
        assert!(store
            .latest_completed("opp-1", AnalysisType::HotelMatch)
            .unwrap()
            .is_none());
        assert_eq!(store.count(JobStatus::Pending).unwrap(), 1);
    }
}
