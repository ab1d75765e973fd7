//! Crate-level error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::collaborators::CollaboratorError;
use crate::pipeline::PipelineError;
use crate::secrets::SecretError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum SowpilotError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("job database: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("result store: {0}")]
    Store(#[from] StoreError),

    #[error("analysis run: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("collaborator: {0}")]
    Collaborator(#[from] CollaboratorError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a valid sowpilot config document: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("{message}")]
    Validation { message: String },

    #[error("Failed to resolve secret '{name}': {source}")]
    Secret {
        name: &'static str,
        #[source]
        source: SecretError,
    },

    #[error("Failed to load hotel directory '{path}': {reason}")]
    HotelDirectory { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, SowpilotError>;
