//! Notification senders. Email transport lives outside this crate; reports
//! are either logged or POSTed to a webhook that relays them.

use async_trait::async_trait;
use reqwest::Client;

use super::http::{check_status, create_http_client, send_error};
use super::{CollaboratorError, Notification, Notifier};

const SERVICE: &str = "notifier";

/// Writes notifications to the process log only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        tracing::info!(
            job_id = %notification.job_id,
            recipients = notification.recipients.len(),
            "{}",
            notification.subject
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: create_http_client(SERVICE, concat!("sowpilot/", env!("CARGO_PKG_VERSION")))?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        check_status(SERVICE, response).await?;
        Ok(())
    }
}
