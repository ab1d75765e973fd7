//! Job repository: CRUD operations for the `analysis_jobs` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database. JSON columns are kept as text here;
/// decoding happens in the store layer.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub opportunity_ref: String,
    pub analysis_type: String,
    pub status: String,
    pub options: String,
    pub result_json: Option<String>,
    pub artifact_paths: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            opportunity_ref: row.get("opportunity_ref")?,
            analysis_type: row.get("analysis_type")?,
            status: row.get("status")?,
            options: row.get("options")?,
            result_json: row.get("result_json")?,
            artifact_paths: row.get("artifact_paths")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Records a freshly created analysis job.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO analysis_jobs (id, opportunity_ref, analysis_type, status, options,
             result_json, artifact_paths, created_at, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                job.id,
                job.opportunity_ref,
                job.analysis_type,
                job.status,
                job.options,
                job.result_json,
                job.artifact_paths,
                job.created_at,
                job.started_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Overwrites the mutable columns of a job that has not yet reached a
/// terminal status. Returns `false` when no row matched, either because the
/// job does not exist or because it is already completed/failed.
pub fn update_if_active(db: &Database, job: &JobRow) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE analysis_jobs SET status=?2, result_json=?3, artifact_paths=?4,
             started_at=?5, completed_at=?6
             WHERE id=?1 AND status IN ('pending', 'running')",
            params![
                job.id,
                job.status,
                job.result_json,
                job.artifact_paths,
                job.started_at,
                job.completed_at,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Loads one analysis job, or `None` for an unknown id.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM analysis_jobs WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Finds the most recently created job for an opportunity and analysis type
/// with the given status.
pub fn find_latest(
    db: &Database,
    opportunity_ref: &str,
    analysis_type: &str,
    status: &str,
) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM analysis_jobs
                 WHERE opportunity_ref = ?1 AND analysis_type = ?2 AND status = ?3
                 ORDER BY created_at DESC LIMIT 1",
                params![opportunity_ref, analysis_type, status],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Number of analysis jobs currently in `status`.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM analysis_jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("in-memory job database")
    }

    fn sample_job(id: &str) -> JobRow {
        JobRow {
            id: id.to_string(),
            opportunity_ref: "opp-1".to_string(),
            analysis_type: "hotel_match".to_string(),
            status: "pending".to_string(),
            options: "{}".to_string(),
            result_json: None,
            artifact_paths: "[]".to_string(),
            created_at: "2026-01-01T00:00:00.000000Z".to_string(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert(&db, &sample_job("job-1")).unwrap();

        let found = find_by_id(&db, "job-1").unwrap().unwrap();
        assert_eq!(found.opportunity_ref, "opp-1");
        assert_eq!(found.status, "pending");
        assert_eq!(found.artifact_paths, "[]");
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_update_active_job() {
        let db = test_db();
        let mut job = sample_job("job-2");
        insert(&db, &job).unwrap();

        job.status = "completed".to_string();
        job.result_json = Some(r#"{"hotels":[]}"#.to_string());
        job.completed_at = Some("2026-01-01T01:00:00.000000Z".to_string());
        assert!(update_if_active(&db, &job).unwrap());

        let found = find_by_id(&db, "job-2").unwrap().unwrap();
        assert_eq!(found.status, "completed");
        assert_eq!(found.result_json.as_deref(), Some(r#"{"hotels":[]}"#));
        assert!(found.completed_at.is_some());
    }

    #[test]
    fn test_terminal_job_is_not_overwritten() {
        let db = test_db();
        let mut job = sample_job("job-3");
        job.status = "failed".to_string();
        insert(&db, &job).unwrap();

        job.status = "running".to_string();
        assert!(!update_if_active(&db, &job).unwrap());

        let found = find_by_id(&db, "job-3").unwrap().unwrap();
        assert_eq!(found.status, "failed");
    }

    #[test]
    fn test_find_latest_picks_newest() {
        let db = test_db();
        let mut old = sample_job("old");
        old.status = "completed".to_string();
        insert(&db, &old).unwrap();

        let mut new = sample_job("new");
        new.status = "completed".to_string();
        new.created_at = "2026-02-01T00:00:00.000000Z".to_string();
        insert(&db, &new).unwrap();

        let mut running = sample_job("running");
        running.status = "running".to_string();
        running.created_at = "2026-03-01T00:00:00.000000Z".to_string();
        insert(&db, &running).unwrap();

        let found = find_latest(&db, "opp-1", "hotel_match", "completed")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "new");
        assert!(find_latest(&db, "opp-2", "hotel_match", "completed")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_count_by_status() {
        let db = test_db();
        insert(&db, &sample_job("c1")).unwrap();
        insert(&db, &sample_job("c2")).unwrap();

        assert_eq!(count_by_status(&db, "pending").unwrap(), 2);
        assert_eq!(count_by_status(&db, "failed").unwrap(), 0);
    }
}
