pub mod model;
pub mod options;

pub use model::{AnalysisJob, AnalysisType, InvalidTransition, JobStatus, UnknownAnalysisType};
pub use options::{JobOptions, OptionsError};
