//! Storage traits and error types
//!
//! The engine only ever sees these narrow interfaces; concrete backends live beside them.

use crate::client::PlayerRecord;
use crate::config::CrawlConfig;
use crate::state::CrawlPosition;
use crate::storage::PassRecord;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported persisted state version: {0}")]
    UnsupportedVersion(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable home of the crawl configuration and position
///
/// `save` must be atomic with respect to `load`: a reader never observes a config from one
/// save paired with a position from another.
pub trait ProgressStore: Send + Sync {
    /// Loads the persisted pair, or `None` on first boot
    fn load(&self) -> StorageResult<Option<(CrawlConfig, CrawlPosition)>>;

    /// Atomically replaces the persisted pair
    fn save(&self, config: &CrawlConfig, position: &CrawlPosition) -> StorageResult<()>;

    /// Loads the persisted pair, falling back to `defaults` positioned at the range start
    fn load_or_default(&self, defaults: &CrawlConfig) -> StorageResult<(CrawlConfig, CrawlPosition)> {
        Ok(self.load()?.unwrap_or_else(|| {
            (
                defaults.clone(),
                CrawlPosition::new(defaults.id_range.start),
            )
        }))
    }
}

/// Destination for fetched records
///
/// `upsert` is idempotent: writing the same `(id, record)` twice leaves the same
/// observable state as writing it once.
pub trait ResultSink: Send + Sync {
    fn upsert(&self, id: u64, record: &PlayerRecord) -> StorageResult<()>;
}

/// Optional recorder for completed passes
pub trait PassRecorder: Send + Sync {
    fn record_pass(&self, pass: &PassRecord) -> StorageResult<()>;
}
