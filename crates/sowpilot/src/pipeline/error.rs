use thiserror::Error;

use super::phase::Phase;
use crate::collaborators::CollaboratorError;
use crate::job::{OptionsError, UnknownAnalysisType};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Rejected before any job record exists.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{phase} failed: {source}")]
    CollaboratorUnavailable {
        phase: Phase,
        #[source]
        source: CollaboratorError,
    },

    #[error("Malformed upstream data in {phase}: {detail}")]
    MalformedUpstreamData { phase: Phase, detail: String },

    #[error("Decision cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("No usable documents for opportunity '{0}'")]
    NoDocuments(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl PipelineError {
    /// Short machine-readable reason recorded in `resultPayload.error`.
    pub fn reason(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration_error",
            PipelineError::CollaboratorUnavailable { .. } => "collaborator_unavailable",
            PipelineError::MalformedUpstreamData { .. } => "malformed_upstream_data",
            PipelineError::CacheUnavailable(_) => "cache_unavailable",
            PipelineError::NoDocuments(_) => "no_documents",
            PipelineError::Storage(_) => "storage_error",
        }
    }

    /// The phase the error surfaced in, when it belongs to one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            PipelineError::CollaboratorUnavailable { phase, .. }
            | PipelineError::MalformedUpstreamData { phase, .. } => Some(*phase),
            PipelineError::CacheUnavailable(_) => Some(Phase::CacheLookup),
            PipelineError::NoDocuments(_) => Some(Phase::DocumentCollection),
            PipelineError::Storage(_) => Some(Phase::Persist),
            PipelineError::Configuration(_) => None,
        }
    }

    pub fn unavailable(phase: Phase, source: CollaboratorError) -> Self {
        PipelineError::CollaboratorUnavailable { phase, source }
    }
}

impl From<UnknownAnalysisType> for PipelineError {
    fn from(e: UnknownAnalysisType) -> Self {
        PipelineError::Configuration(e.to_string())
    }
}

impl From<OptionsError> for PipelineError {
    fn from(e: OptionsError) -> Self {
        PipelineError::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_and_phases() {
        let err: PipelineError = "pricing".parse::<crate::job::AnalysisType>().unwrap_err().into();
        assert_eq!(err.reason(), "configuration_error");
        assert!(err.phase().is_none());
        assert!(err.to_string().contains("unknown analysis type 'pricing'"));

        let err = PipelineError::unavailable(
            Phase::DocumentCollection,
            CollaboratorError::Unavailable {
                service: "document provider",
                reason: "connection refused".to_string(),
            },
        );
        assert_eq!(err.reason(), "collaborator_unavailable");
        assert_eq!(err.phase(), Some(Phase::DocumentCollection));
        assert!(err.to_string().starts_with("document_collection failed"));
    }
}
