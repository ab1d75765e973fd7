//! Fire-and-forget delivery of job reports.
//!
//! The orchestrator only enqueues; a separate dispatcher task owns the
//! notifier, so a slow or failing delivery can never block or reopen a job.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::phase::Phase;
use crate::collaborators::{Notification, Notifier};
use crate::store::{JobLogger, LogSink};

/// Sending half, held by the orchestrator.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<Notification>,
}

impl NotificationQueue {
    /// Queues a notification. Returns false when the queue is full or the
    /// dispatcher is gone; the notification is then dropped.
    pub fn enqueue(&self, notification: Notification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(n)) => {
                warn!(job_id = %n.job_id, "Notification queue full, dropping report");
                false
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                warn!(job_id = %n.job_id, "Notification dispatcher stopped, dropping report");
                false
            }
        }
    }
}

/// Receiving half: delivers queued notifications one at a time.
pub struct NotificationDispatcher {
    rx: mpsc::Receiver<Notification>,
    notifier: Arc<dyn Notifier>,
    logs: Arc<dyn LogSink>,
}

/// Creates a bounded queue and the dispatcher that drains it.
pub fn notification_channel(
    capacity: usize,
    notifier: Arc<dyn Notifier>,
    logs: Arc<dyn LogSink>,
) -> (NotificationQueue, NotificationDispatcher) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        NotificationQueue { tx },
        NotificationDispatcher {
            rx,
            notifier,
            logs,
        },
    )
}

impl NotificationDispatcher {
    /// Runs until every queue handle has been dropped.
    pub async fn run(mut self) {
        while let Some(notification) = self.rx.recv().await {
            self.deliver(&notification).await;
        }
        debug!("Notification dispatcher stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn deliver(&self, notification: &Notification) {
        let log = JobLogger::new(self.logs.clone(), &notification.job_id);
        let step = Phase::Notify.as_str();
        match self.notifier.notify(notification).await {
            Ok(()) => log.info(
                step,
                format!(
                    "Report delivered to {} recipient(s)",
                    notification.recipients.len()
                ),
            ),
            Err(e) => log.warn(step, format!("Report delivery failed: {}", e)),
        }
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::job::{AnalysisType, JobStatus};
    use crate::store::{LogLevel, SqliteLogSink};
    use crate::testing::RecordingNotifier;

    fn notification(job_id: &str) -> Notification {
        Notification {
            job_id: job_id.to_string(),
            opportunity_ref: "opp-1".to_string(),
            analysis_type: AnalysisType::HotelMatch,
            status: JobStatus::Completed,
            recipients: vec!["ops@example.com".to_string()],
            subject: "hotel_match completed".to_string(),
            report: "# report".to_string(),
        }
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_and_logs() {
        let logs: Arc<dyn LogSink> =
            Arc::new(SqliteLogSink::new(Database::open_in_memory().unwrap()));
        let notifier = Arc::new(RecordingNotifier::new());
        let (queue, dispatcher) = notification_channel(8, notifier.clone(), logs.clone());

        assert!(queue.enqueue(notification("job-1")));
        drop(queue);
        dispatcher.run().await;

        assert_eq!(notifier.delivered().len(), 1);
        let entries = logs.tail("job-1", None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].step, "notify");
        assert_eq!(entries[0].level, LogLevel::Info);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_a_warning() {
        let logs: Arc<dyn LogSink> =
            Arc::new(SqliteLogSink::new(Database::open_in_memory().unwrap()));
        let notifier = Arc::new(RecordingNotifier::failing());
        let (queue, dispatcher) = notification_channel(8, notifier, logs.clone());

        queue.enqueue(notification("job-2"));
        drop(queue);
        dispatcher.run().await;

        let entries = logs.tail("job-2", None).unwrap();
        assert_eq!(entries[0].level, LogLevel::Warning);
        assert!(entries[0].message.contains("delivery failed"));
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let logs: Arc<dyn LogSink> =
            Arc::new(SqliteLogSink::new(Database::open_in_memory().unwrap()));
        let (queue, _dispatcher) =
            notification_channel(1, Arc::new(RecordingNotifier::new()), logs);

        assert!(queue.enqueue(notification("a")));
        assert!(!queue.enqueue(notification("b")));
    }
}
