use crate::config::types::{CrawlConfig, Settings};
use crate::config::validation::validate;
use crate::{ConfigError, ConfigResult};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and validates a settings file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML settings file
///
/// # Returns
///
/// * `Ok(Settings)` - Successfully loaded and validated settings
/// * `Err(ConfigError)` - Failed to load, parse, or validate the settings
pub fn load_settings(path: &Path) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_settings(&content)
}

/// Parses and validates settings from TOML text
pub fn parse_settings(content: &str) -> ConfigResult<Settings> {
    let settings: Settings = toml::from_str(content)?;
    validate(&settings)?;
    Ok(settings)
}

/// Computes a SHA-256 fingerprint of a crawl configuration
///
/// Stored alongside each completed pass so history rows can be tied to the parameters
/// that produced them.
pub fn compute_config_hash(config: &CrawlConfig) -> String {
    let canonical = serde_json::to_string(config).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdRange;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_settings() {
        let content = r#"
[api]
key = "abc123"
base_url = "https://api.example.com"
max_calls = 60
window_seconds = 60

[crawl]
enabled = true
interval_minutes = 30
id_range = { start = 100, end = 200 }
request_delay_ms = 50
batch_size = 10
max_concurrent_requests = 4

[storage]
database_path = "./test.db"
"#;

        let file = create_temp_config(content);
        let settings = load_settings(file.path()).unwrap();

        assert_eq!(settings.api.max_calls, 60);
        assert!(settings.crawl.enabled);
        assert_eq!(settings.crawl.id_range, IdRange::new(100, 200));
        assert_eq!(settings.crawl.max_concurrent_requests, 4);
        assert_eq!(settings.storage.database_path, "./test.db");
        assert_eq!(settings.engine.max_transient_retries, 3);
    }

    #[test]
    fn test_minimal_settings_use_defaults() {
        let settings = parse_settings("[api]\nkey = \"abc\"\n").unwrap();
        assert_eq!(settings.api.base_url, "https://api.torn.com");
        assert_eq!(settings.crawl, CrawlConfig::default());
        assert_eq!(settings.engine.speed_window_seconds, 300);
    }

    #[test]
    fn test_load_settings_with_invalid_path() {
        let result = load_settings(Path::new("/nonexistent/crawler.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_settings_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_settings(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_inverted_crawl_range_is_rejected() {
        let content = r#"
[api]
key = "abc"

[crawl]
id_range = { start = 50, end = 10 }
"#;
        let result = parse_settings(content);
        assert!(matches!(result, Err(ConfigError::Crawl(_))));
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let result = parse_settings("[api]\nkey = \"\"\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_bad_base_url_is_rejected() {
        let result = parse_settings("[api]\nkey = \"abc\"\nbase_url = \"not a url\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_config_hash_is_stable() {
        let config = CrawlConfig::default();
        let hash1 = compute_config_hash(&config);
        let hash2 = compute_config_hash(&config.clone());

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_config_different_hash() {
        let a = CrawlConfig::default();
        let b = CrawlConfig {
            batch_size: a.batch_size + 1,
            ..a.clone()
        };
        assert_ne!(compute_config_hash(&a), compute_config_hash(&b));
    }
}
