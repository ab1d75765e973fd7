//! Pipeline Orchestrator: the job state machine.
//!
//! A run moves `pending → running → {completed | failed}` through the
//! phases in [`Phase`]. Every phase boundary and branch decision is written
//! to the job's log; fatal errors fail the job, degradable ones set
//! `fallback_used` and let it complete.

pub mod artifacts;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod phase;
pub mod runner;

pub use artifacts::{render_report, ArtifactError, ArtifactWriter};
pub use context::{EventProfile, RunContext};
pub use dispatch::{notification_channel, NotificationDispatcher, NotificationQueue};
pub use error::PipelineError;
pub use phase::{Phase, JOB_STEP};
pub use runner::{Collaborators, JobHandle, Orchestrator, OrchestratorSettings};
