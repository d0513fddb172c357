//! Storage module for persisting crawl progress and fetched records
//!
//! This module handles:
//! - The durable `{config, position}` record the engine resumes from
//! - Upserting fetched player records and their listings
//! - Pass history (one row per completed sweep of the ID range)
//!
//! Backends are swappable: [`SqliteStore`] for production, [`MemoryStore`] for tests.

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{PassRecorder, ProgressStore, ResultSink, StorageError, StorageResult};

use crate::config::CrawlConfig;
use crate::state::CrawlPosition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version of the persisted state layout written by this build
pub const STATE_VERSION: u32 = 1;

/// The single versioned record a progress store keeps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    pub config: CrawlConfig,
    pub position: CrawlPosition,
}

impl PersistedState {
    pub fn new(config: CrawlConfig, position: CrawlPosition) -> Self {
        Self {
            version: STATE_VERSION,
            config,
            position,
        }
    }

    /// Encodes the record as JSON
    pub fn encode(&self) -> StorageResult<String> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Decodes a JSON record, rejecting layouts newer than this build understands
    pub fn decode(payload: &str) -> StorageResult<Self> {
        let state: Self = serde_json::from_str(payload)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        if state.version > STATE_VERSION {
            return Err(StorageError::UnsupportedVersion(state.version));
        }
        Ok(state)
    }
}

/// One completed sweep of the ID range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub ids_scanned: u64,
    pub records_found: u64,
    pub config_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persisted_state_roundtrip() {
        let state = PersistedState::new(CrawlConfig::default(), CrawlPosition::new(42));
        let decoded = PersistedState::decode(&state.encode().unwrap()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let mut state = PersistedState::new(CrawlConfig::default(), CrawlPosition::new(1));
        state.version = STATE_VERSION + 1;
        let payload = serde_json::to_string(&state).unwrap();

        let result = PersistedState::decode(&payload);
        assert!(matches!(result, Err(StorageError::UnsupportedVersion(v)) if v == STATE_VERSION + 1));
    }

    #[test]
    fn test_garbage_payload_is_serialization_error() {
        let result = PersistedState::decode("{not json");
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }
}
