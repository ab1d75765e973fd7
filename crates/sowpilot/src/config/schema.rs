use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// SQLite database file. Defaults to `~/.sowpilot/data/sowpilot.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_artifact_directory")]
    pub artifact_directory: String,
    /// Root of the already-downloaded opportunity documents,
    /// laid out as `<document_root>/<opportunity_ref>/*`.
    pub document_root: String,
    /// JSON file holding the hotel directory.
    pub hotel_directory: String,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub hotel_search: HotelSearchConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_artifact_directory() -> String {
    "artifacts".to_string()
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        match &self.database_path {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => crate::db::default_database_path()
                .unwrap_or_else(|| PathBuf::from("sowpilot.db")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Budget for a single collaborator call.
    #[serde(default = "default_phase_timeout_secs")]
    pub phase_timeout_secs: u64,
    /// Wait before the single retry of a transient collaborator failure.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Ranked hotels kept when a job does not set `limit`.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

fn default_phase_timeout_secs() -> u64 {
    120
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_limit() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            phase_timeout_secs: default_phase_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
            default_limit: default_limit(),
            cache_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    #[serde(default = "default_geocoding_url")]
    pub base_url: String,
    /// Nominatim's usage policy requires an identifying user agent.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

fn default_geocoding_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    concat!("sowpilot/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_min_interval_ms() -> u64 {
    1000
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: default_geocoding_url(),
            user_agent: default_user_agent(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelSearchConfig {
    /// When disabled, ranked hotels are returned without prices.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_hotel_search_url")]
    pub base_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_id_file: Option<String>,
    #[serde(default)]
    pub client_id_env_var: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_secret_file: Option<String>,
    #[serde(default)]
    pub client_secret_env_var: Option<String>,
}

fn default_hotel_search_url() -> String {
    "https://test.api.amadeus.com".to_string()
}

impl Default for HotelSearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_hotel_search_url(),
            client_id: None,
            client_id_file: None,
            client_id_env_var: None,
            client_secret: None,
            client_secret_file: None,
            client_secret_env_var: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`.
    #[serde(default = "default_oracle_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
    /// Document text beyond this many characters is cut before extraction.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

fn default_oracle_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env_var() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

fn default_max_input_chars() -> usize {
    60_000
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_oracle_url(),
            model: default_model(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Reports are POSTed here as JSON. Without it they are only logged.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_defaults() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.phase_timeout(), Duration::from_secs(120));
        assert_eq!(pipeline.retry_backoff(), Duration::from_millis(2000));
        assert!(pipeline.cache_enabled);

        assert_eq!(GeocodingConfig::default().min_interval_ms, 1000);
        assert!(!HotelSearchConfig::default().enabled);
        assert_eq!(
            OracleConfig::default().api_key_env_var.as_deref(),
            Some("OPENAI_API_KEY")
        );
        assert_eq!(ServerConfig::default().bind, "127.0.0.1:8080");
    }
}
