//! Shared state handed to every request handler.

use std::sync::Arc;

use sowpilot::{LogBroadcaster, Orchestrator};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Live feed of appended job log entries.
    pub log_feed: LogBroadcaster,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, log_feed: LogBroadcaster) -> Self {
        Self {
            orchestrator,
            log_feed,
        }
    }
}
