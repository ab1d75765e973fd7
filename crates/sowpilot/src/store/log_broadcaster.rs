//! Live feed of job log entries for the server-sent events endpoint.

use tokio::sync::broadcast;

use super::log_sink::LogEntry;

/// Fans out appended job log entries to live subscribers.
#[derive(Clone)]
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
}

impl LogBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns how many subscribers received the entry.
    pub fn send(&self, entry: LogEntry) -> usize {
        self.sender.send(entry).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

/// Entries a slow stream client may fall behind by before it sees a lag.
const DEFAULT_BACKLOG: usize = 1024;

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BACKLOG)
    }
}

impl std::fmt::Debug for LogBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBroadcaster")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
