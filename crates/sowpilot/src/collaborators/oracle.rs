//! Structured extraction through an OpenAI-compatible chat completion API.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use super::http::{check_status, create_http_client, send_error};
use super::{CollaboratorError, ExtractionOracle};
use crate::config::OracleConfig;

const SERVICE: &str = "extraction oracle";

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Cuts `text` to at most `max_chars` characters.
fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Parses the model's reply. Anything that is not JSON becomes `Null`,
/// which downstream normalization treats as malformed upstream data.
fn parse_content(content: Option<&str>) -> Value {
    let Some(content) = content.map(str::trim).filter(|c| !c.is_empty()) else {
        return Value::Null;
    };
    // Some models wrap JSON in a fenced block despite json mode.
    let unfenced = content
        .strip_prefix("```json")
        .or_else(|| content.strip_prefix("```"))
        .and_then(|c| c.strip_suffix("```"))
        .unwrap_or(content)
        .trim();
    serde_json::from_str(unfenced).unwrap_or_else(|e| {
        log::warn!("Extraction oracle returned unparsable content: {}", e);
        Value::Null
    })
}

pub struct OpenAiExtractionOracle {
    client: Client,
    completions_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_input_chars: usize,
}

impl OpenAiExtractionOracle {
    pub fn new(
        config: &OracleConfig,
        api_key: Option<SecretString>,
    ) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: create_http_client(SERVICE, concat!("sowpilot/", env!("CARGO_PKG_VERSION")))?,
            completions_url: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            model: config.model.clone(),
            api_key,
            max_input_chars: config.max_input_chars,
        })
    }

    fn request_body(&self, text: &str, instructions: &str) -> Value {
        json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": instructions },
                { "role": "user", "content": clip(text, self.max_input_chars) }
            ]
        })
    }
}

impl std::fmt::Debug for OpenAiExtractionOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiExtractionOracle")
            .field("completions_url", &self.completions_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ExtractionOracle for OpenAiExtractionOracle {
    async fn extract(&self, text: &str, instructions: &str) -> Result<Value, CollaboratorError> {
        let mut request = self
            .client
            .post(&self.completions_url)
            .json(&self.request_body(text, instructions));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| send_error(SERVICE, e))?;
        let chat: ChatResponse = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse {
                service: SERVICE,
                reason: e.to_string(),
            })?;

        let content = chat
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref());
        Ok(parse_content(content))
    }
}
