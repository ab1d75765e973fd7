pub mod cache;
pub mod collaborators;
pub mod config;
pub mod db;
pub mod error;
pub mod hotels;
pub mod job;
pub mod normalize;
pub mod pipeline;
pub mod ratelimit;
pub mod secrets;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{CacheEntry, DecisionCache, Fingerprint};
pub use config::{load_config, Config};
pub use db::Database;
pub use error::{ConfigError, Result, SowpilotError};
pub use hotels::{Hotel, HotelMatchResult, MatchingEngine};
pub use job::{AnalysisJob, AnalysisType, JobOptions, JobStatus};
pub use pipeline::{Collaborators, JobHandle, Orchestrator, OrchestratorSettings, PipelineError};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use store::{LogBroadcaster, LogEntry, LogLevel, LogSink, ResultStore};
