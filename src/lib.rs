//! Bazaar-Crawler: a resumable, rate-limited ID-range crawler
//!
//! This crate walks a sparse numeric player-ID space, fetches one record per ID from a
//! rate-limited game API, persists its position after every batch so it can resume after a
//! restart, and exposes live status for operators.

pub mod api;
pub mod client;
pub mod config;
pub mod engine;
pub mod state;
pub mod status;
pub mod storage;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid crawl configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::EngineState,
        to: state::EngineState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid crawl section: {0}")]
    Crawl(#[from] ValidationError),
}

/// Rejected crawl configuration
///
/// Returned eagerly by reconfiguration; the engine's state and applied config are left
/// untouched when this is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid id_range {start}-{end}: start must not exceed end, end must be below u64::MAX")]
    InvalidRange { start: u64, end: u64 },

    #[error("batch_size must be >= 1")]
    ZeroBatchSize,

    #[error("max_concurrent_requests must be >= 1")]
    ZeroConcurrency,

    #[error("max_concurrent_requests must be <= {max}, got {got}")]
    TooManyConcurrent { max: u32, got: u32 },
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use api::OperatorApi;
pub use client::{FetchOutcome, PlayerRecord, RateLimitedClient, RecordFetcher};
pub use config::{CrawlConfig, IdRange, Settings};
pub use engine::{CrawlEngine, EngineDeps, EngineSettings};
pub use state::{CrawlPosition, EngineState};
pub use status::CrawlStatus;
pub use storage::{MemoryStore, ProgressStore, ResultSink, SqliteStore};
