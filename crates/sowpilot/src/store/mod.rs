//! Result Store and Log Sink: the durable record of every analysis job.
//!
//! Both are shared by all concurrently running jobs and are handed to the
//! orchestrator as trait objects. The SQLite implementations write one row
//! per call, so readers never observe a partially written record.

use thiserror::Error;

use crate::db::DatabaseError;

pub mod log_broadcaster;
pub mod log_sink;
pub mod result_store;

pub use log_broadcaster::LogBroadcaster;
pub use log_sink::{JobLogger, LogEntry, LogLevel, LogSink, SqliteLogSink};
pub use result_store::{ResultStore, SqliteResultStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// The job does not exist or has already reached a terminal status.
    #[error("Job '{0}' is not writable (missing or terminal)")]
    NotWritable(String),

    #[error("Stored job '{id}' is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
}
