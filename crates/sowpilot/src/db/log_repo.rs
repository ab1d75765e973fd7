//! Log repository: append-only access to the `analysis_logs` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw log row from the database.
#[derive(Debug, Clone)]
pub struct LogRow {
    pub job_id: String,
    pub level: String,
    pub step: String,
    pub message: String,
    pub created_at: String,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            level: row.get("level")?,
            step: row.get("step")?,
            message: row.get("message")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Appends a log row.
pub fn append(db: &Database, entry: &LogRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO analysis_logs (job_id, level, step, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.job_id,
                entry.level,
                entry.step,
                entry.message,
                entry.created_at
            ],
        )?;
        Ok(())
    })
}

/// Returns the newest `limit` entries for a job (all entries when `None`),
/// ordered oldest to newest by `created_at` then insertion order.
pub fn tail(db: &Database, job_id: &str, limit: Option<u64>) -> Result<Vec<LogRow>, DatabaseError> {
    db.with_conn(|conn| {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(
            "SELECT * FROM (
                 SELECT * FROM analysis_logs WHERE job_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2
             ) ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![job_id, limit], LogRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
