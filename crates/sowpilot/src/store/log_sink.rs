//! Log Sink: append-only, per-job structured log stream.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LogBroadcaster, StoreError};
use crate::db::log_repo::{self, LogRow};
use crate::db::{format_timestamp, parse_timestamp, Database};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// One entry of a job's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub job_id: String,
    pub level: LogLevel,
    /// Pipeline stage tag, e.g. `cache_lookup`.
    pub step: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(job_id: &str, level: LogLevel, step: &str, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            level,
            step: step.to_string(),
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only store of job log entries.
pub trait LogSink: Send + Sync {
    fn append(&self, entry: &LogEntry) -> Result<(), StoreError>;

    /// The newest `limit` entries (all when `None`), oldest first.
    fn tail(&self, job_id: &str, limit: Option<u64>) -> Result<Vec<LogEntry>, StoreError>;
}

/// [`LogSink`] backed by the `analysis_logs` table. Every persisted entry
/// is also published on the optional broadcaster.
#[derive(Debug, Clone)]
pub struct SqliteLogSink {
    db: Database,
    broadcaster: Option<LogBroadcaster>,
}

impl SqliteLogSink {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            broadcaster: None,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: LogBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }
}

impl LogSink for SqliteLogSink {
    fn append(&self, entry: &LogEntry) -> Result<(), StoreError> {
        log_repo::append(
            &self.db,
            &LogRow {
                job_id: entry.job_id.clone(),
                level: entry.level.as_str().to_string(),
                step: entry.step.clone(),
                message: entry.message.clone(),
                created_at: format_timestamp(entry.created_at),
            },
        )?;
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.send(entry.clone());
        }
        Ok(())
    }

    fn tail(&self, job_id: &str, limit: Option<u64>) -> Result<Vec<LogEntry>, StoreError> {
        log_repo::tail(&self.db, job_id, limit)?
            .into_iter()
            .map(|row| {
                let level = row.level.parse::<LogLevel>().map_err(|reason| {
                    StoreError::Corrupt {
                        id: row.job_id.clone(),
                        reason,
                    }
                })?;
                Ok(LogEntry {
                    created_at: parse_timestamp(&row.created_at),
                    job_id: row.job_id,
                    level,
                    step: row.step,
                    message: row.message,
                })
            })
            .collect()
    }
}

/// Writes a single job's audit trail.
///
/// Entries are mirrored to `tracing`. A failing sink never fails the job;
/// the error is reported through `tracing` instead.
#[derive(Clone)]
pub struct JobLogger {
    sink: Arc<dyn LogSink>,
    job_id: String,
}

impl JobLogger {
    pub fn new(sink: Arc<dyn LogSink>, job_id: &str) -> Self {
        Self {
            sink,
            job_id: job_id.to_string(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn log(&self, level: LogLevel, step: &str, message: impl Into<String>) {
        let entry = LogEntry::new(&self.job_id, level, step, message);
        match level {
            LogLevel::Info => tracing::info!(job_id = %self.job_id, step, "{}", entry.message),
            LogLevel::Warning => tracing::warn!(job_id = %self.job_id, step, "{}", entry.message),
            LogLevel::Error => tracing::error!(job_id = %self.job_id, step, "{}", entry.message),
        }
        if let Err(e) = self.sink.append(&entry) {
            tracing::error!(job_id = %self.job_id, step, "Failed to append job log entry: {}", e);
        }
    }

    pub fn info(&self, step: &str, message: impl Into<String>) {
        self.log(LogLevel::Info, step, message);
    }

    pub fn warn(&self, step: &str, message: impl Into<String>) {
        self.log(LogLevel::Warning, step, message);
    }

    pub fn error(&self, step: &str, message: impl Into<String>) {
        self.log(LogLevel::Error, step, message);
    }
}

impl fmt::Debug for JobLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobLogger")
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}
