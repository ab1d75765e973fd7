use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::secrets::has_secret_source;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

fn validate_url(field: &str, url: &str) -> Result<(), ConfigError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|e| invalid(format!("{} '{}': {}", field, url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!(
            "{} '{}' must use http or https",
            field, url
        )));
    }
    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.document_root.trim().is_empty() {
        return Err(invalid("document_root must not be empty"));
    }
    if config.hotel_directory.trim().is_empty() {
        return Err(invalid("hotel_directory must not be empty"));
    }

    let pipeline = &config.pipeline;
    if pipeline.phase_timeout_secs == 0 {
        return Err(invalid("pipeline.phase_timeout_secs must be greater than zero"));
    }
    if pipeline.default_limit == 0 {
        return Err(invalid("pipeline.default_limit must be greater than zero"));
    }

    validate_url("geocoding.base_url", &config.geocoding.base_url)?;
    if config.geocoding.min_interval_ms < 1000 {
        return Err(invalid(
            "geocoding.min_interval_ms must be at least 1000 (one request per second)",
        ));
    }
    if config.geocoding.user_agent.trim().is_empty() {
        return Err(invalid("geocoding.user_agent must not be empty"));
    }

    validate_url("oracle.base_url", &config.oracle.base_url)?;
    if config.oracle.model.trim().is_empty() {
        return Err(invalid("oracle.model must not be empty"));
    }
    if config.oracle.max_input_chars == 0 {
        return Err(invalid("oracle.max_input_chars must be greater than zero"));
    }

    let search = &config.hotel_search;
    if search.enabled {
        validate_url("hotel_search.base_url", &search.base_url)?;
        if !has_secret_source(
            search.client_id.as_deref(),
            search.client_id_file.as_deref(),
            search.client_id_env_var.as_deref(),
        ) {
            return Err(invalid("hotel_search is enabled but no client_id source is set"));
        }
        if !has_secret_source(
            search.client_secret.as_deref(),
            search.client_secret_file.as_deref(),
            search.client_secret_env_var.as_deref(),
        ) {
            return Err(invalid(
                "hotel_search is enabled but no client_secret source is set",
            ));
        }
    }

    if let Some(url) = &config.notifications.webhook_url {
        validate_url("notifications.webhook_url", url)?;
    }

    Ok(())
}
