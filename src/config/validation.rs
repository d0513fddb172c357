use crate::config::types::{ApiConfig, CrawlConfig, EngineConfig, Settings, StorageConfig};
use crate::{ConfigError, ConfigResult, ValidationError};
use url::Url;

/// Upper bound on `max_concurrent_requests`
pub const MAX_CONCURRENT_REQUESTS: u32 = 100;

/// Validates the entire settings file
pub fn validate(settings: &Settings) -> ConfigResult<()> {
    validate_api_config(&settings.api)?;
    validate_crawl_config(&settings.crawl)?;
    validate_storage_config(&settings.storage)?;
    validate_engine_config(&settings.engine)?;
    Ok(())
}

/// Checks the invariants of a crawl configuration
///
/// Used both on settings load and on every operator reconfiguration.
pub fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ValidationError> {
    // The position runs one past `end`, so `end` must leave room for it
    if config.id_range.start > config.id_range.end || config.id_range.end == u64::MAX {
        return Err(ValidationError::InvalidRange {
            start: config.id_range.start,
            end: config.id_range.end,
        });
    }

    if config.batch_size < 1 {
        return Err(ValidationError::ZeroBatchSize);
    }

    if config.max_concurrent_requests < 1 {
        return Err(ValidationError::ZeroConcurrency);
    }

    if config.max_concurrent_requests > MAX_CONCURRENT_REQUESTS {
        return Err(ValidationError::TooManyConcurrent {
            max: MAX_CONCURRENT_REQUESTS,
            got: config.max_concurrent_requests,
        });
    }

    Ok(())
}

/// Validates API configuration
fn validate_api_config(config: &ApiConfig) -> ConfigResult<()> {
    if config.key.trim().is_empty() {
        return Err(ConfigError::Validation("api key cannot be empty".to_string()));
    }

    if !config.key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::Validation(
            "api key must contain only ASCII letters and digits".to_string(),
        ));
    }

    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.max_calls < 1 {
        return Err(ConfigError::Validation(format!(
            "max_calls must be >= 1, got {}",
            config.max_calls
        )));
    }

    if config.window_seconds < 1 {
        return Err(ConfigError::Validation(format!(
            "window_seconds must be >= 1, got {}",
            config.window_seconds
        )));
    }

    if config.request_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_ms must be >= 100ms, got {}ms",
            config.request_timeout_ms
        )));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> ConfigResult<()> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates engine tuning
fn validate_engine_config(config: &EngineConfig) -> ConfigResult<()> {
    if config.log_capacity < 1 {
        return Err(ConfigError::Validation(
            "log_capacity must be >= 1".to_string(),
        ));
    }

    if config.speed_window_seconds < 1 {
        return Err(ConfigError::Validation(
            "speed_window_seconds must be >= 1".to_string(),
        ));
    }

    if config.max_transient_retries < 1 {
        return Err(ConfigError::Validation(
            "max_transient_retries must be >= 1".to_string(),
        ));
    }

    Ok(())
}
