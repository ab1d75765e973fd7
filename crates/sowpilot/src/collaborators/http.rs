//! Shared HTTP plumbing for the collaborator clients.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use super::CollaboratorError;

/// Maximum length for error bodies kept in errors and logs.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Default connect timeout for HTTP requests (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default request timeout for HTTP requests (60 seconds).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Creates an HTTP client with appropriate timeouts.
pub fn create_http_client(
    service: &'static str,
    user_agent: &str,
) -> Result<Client, CollaboratorError> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .user_agent(user_agent)
        .build()
        .map_err(|e| CollaboratorError::Unavailable {
            service,
            reason: format!("Failed to create HTTP client: {}", e),
        })
}

/// Truncates a response body so tokens or large payloads do not flood logs.
pub fn truncate_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}

/// Maps a transport failure to the collaborator taxonomy.
pub fn send_error(service: &'static str, err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Timeout {
            service,
            after: DEFAULT_REQUEST_TIMEOUT,
        }
    } else {
        CollaboratorError::Unavailable {
            service,
            reason: err.to_string(),
        }
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Passes successful responses through and classifies the rest:
/// 429 is `RateLimited`, 5xx is `Unavailable`, anything else `Rejected`.
pub async fn check_status(
    service: &'static str,
    response: Response,
) -> Result<Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(CollaboratorError::RateLimited {
            service,
            retry_after: retry_after(&response),
        });
    }

    let body = truncate_body(&response.text().await.unwrap_or_default());
    if status.is_server_error() {
        Err(CollaboratorError::Unavailable {
            service,
            reason: format!("{}: {}", status, body),
        })
    } else {
        Err(CollaboratorError::Rejected {
            service,
            status: status.as_u16(),
            body,
        })
    }
}
