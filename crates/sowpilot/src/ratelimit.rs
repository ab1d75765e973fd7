//! Call pacing, single-retry backoff and per-call timeouts for collaborators.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::collaborators::CollaboratorError;

/// Longest server-requested `Retry-After` we are willing to honor.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Enforces a minimum interval between calls.
///
/// Callers reserve the next free slot under the lock and then sleep until it
/// without holding the lock, so concurrent callers queue up one interval
/// apart and the external call itself is never made under the lock.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn per_second() -> Self {
        Self::new(Duration::from_secs(1))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the caller may issue its call.
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

/// Runs `fut` with a time budget, mapping expiry to `Timeout`.
pub async fn with_timeout<T, Fut>(
    service: &'static str,
    budget: Duration,
    fut: Fut,
) -> Result<T, CollaboratorError>
where
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout {
            service,
            after: budget,
        }),
    }
}

/// Runs `op`, retrying exactly once after `backoff` when the first attempt
/// fails transiently. A server-provided retry-after hint replaces `backoff`.
pub async fn with_retry<T, F, Fut>(backoff: Duration, mut op: F) -> Result<T, CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    match op().await {
        Err(e) if e.is_transient() => {
            let wait = match &e {
                CollaboratorError::RateLimited {
                    retry_after: Some(hint),
                    ..
                } => (*hint).min(MAX_RETRY_AFTER),
                _ => backoff,
            };
            tracing::warn!("{}; retrying once in {:?}", e, wait);
            tokio::time::sleep(wait).await;
            op().await
        }
        other => other,
    }
}
