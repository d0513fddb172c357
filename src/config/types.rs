use serde::{Deserialize, Serialize};

/// Top-level settings file structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api: ApiConfig,

    /// Crawl parameters used on first boot, before anything is persisted
    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// External API access and quota configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API key sent with every request
    pub key: String,

    /// Base URL of the API (e.g. "https://api.torn.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Maximum number of calls allowed per window
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,

    /// Length of the quota window in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Hard timeout for a single request (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Longest a fetch may wait for a rate-limit slot (milliseconds)
    #[serde(default = "default_max_acquire_wait_ms")]
    pub max_acquire_wait_ms: u64,

    /// Backoff applied after a rate-limit signal that carries no retry hint (seconds)
    #[serde(default = "default_cooldown_seconds")]
    pub rate_limit_cooldown_seconds: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

/// Engine tuning that is fixed for the lifetime of the process
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Number of operator log entries retained
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Trailing window used for the speed moving average (seconds)
    #[serde(default = "default_speed_window_seconds")]
    pub speed_window_seconds: u64,

    /// Extra attempts for an ID that keeps failing transiently
    #[serde(default = "default_max_transient_retries")]
    pub max_transient_retries: u32,
}

/// Inclusive range of player IDs covered by one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub start: u64,
    pub end: u64,
}

impl IdRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of IDs in the range
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, id: u64) -> bool {
        id >= self.start && id <= self.end
    }
}

/// Crawl parameters that operators may change while the engine runs
///
/// Changes take effect at the next batch boundary and never pre-empt in-flight requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Whether the engine starts crawling on boot
    #[serde(default)]
    pub enabled: bool,

    /// Minutes between the end of one pass and the start of the next
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// IDs covered by a pass
    #[serde(default = "default_id_range")]
    pub id_range: IdRange,

    /// Minimum pause between two dispatches (milliseconds)
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Number of IDs per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Maximum number of fetches in flight at once
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: default_interval_minutes(),
            id_range: default_id_range(),
            request_delay_ms: default_request_delay_ms(),
            batch_size: default_batch_size(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_capacity: default_log_capacity(),
            speed_window_seconds: default_speed_window_seconds(),
            max_transient_retries: default_max_transient_retries(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.torn.com".to_string()
}

fn default_max_calls() -> u32 {
    100
}

fn default_window_seconds() -> u64 {
    60
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_acquire_wait_ms() -> u64 {
    30_000
}

fn default_cooldown_seconds() -> u64 {
    60
}

fn default_database_path() -> String {
    "./bazaar.db".to_string()
}

fn default_log_capacity() -> usize {
    100
}

fn default_speed_window_seconds() -> u64 {
    300
}

fn default_max_transient_retries() -> u32 {
    3
}

fn default_interval_minutes() -> u64 {
    60
}

fn default_id_range() -> IdRange {
    IdRange::new(1, 3_000_000)
}

fn default_request_delay_ms() -> u64 {
    600
}

fn default_batch_size() -> u32 {
    50
}

fn default_max_concurrent_requests() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_range_len() {
        assert_eq!(IdRange::new(100, 110).len(), 11);
        assert_eq!(IdRange::new(5, 5).len(), 1);
    }

    #[test]
    fn test_id_range_contains() {
        let range = IdRange::new(100, 110);
        assert!(range.contains(100));
        assert!(range.contains(110));
        assert!(!range.contains(99));
        assert!(!range.contains(111));
    }

    #[test]
    fn test_crawl_config_json_shape() {
        let json = r#"{"enabled":true,"interval_minutes":5,"id_range":{"start":1,"end":9},
            "request_delay_ms":0,"batch_size":3,"max_concurrent_requests":2}"#;
        let config: CrawlConfig = serde_json::from_str(json).unwrap();
        assert!(config.enabled);
        assert_eq!(config.id_range, IdRange::new(1, 9));
        assert_eq!(config.batch_size, 3);
    }
}
