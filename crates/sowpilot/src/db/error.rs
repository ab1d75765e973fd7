//! Failures of the SQLite layer behind jobs, logs and the decision cache.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("cannot prepare database directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema migration {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored payload column is not valid JSON.
    #[error("column '{column}' holds invalid JSON: {source}")]
    Json {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("connection mutex poisoned by a panicked writer")]
    LockPoisoned,
}
