//! In-memory storage backend
//!
//! Stands in for SQLite in tests and dry runs. Failures can be injected to exercise the
//! engine's persistence-error path.

use crate::client::PlayerRecord;
use crate::config::CrawlConfig;
use crate::state::CrawlPosition;
use crate::storage::traits::{
    PassRecorder, ProgressStore, ResultSink, StorageError, StorageResult,
};
use crate::storage::{PassRecord, PersistedState};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// In-memory implementation of every storage trait
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<PersistedState>>,
    records: Mutex<BTreeMap<u64, PlayerRecord>>,
    passes: Mutex<Vec<PassRecord>>,
    /// Every position successfully saved, in order
    saved_positions: Mutex<Vec<u64>>,
    fail_saves: AtomicBool,
    fail_upserts: AtomicBool,
    upsert_calls: AtomicUsize,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds a persisted pair
    pub fn with_state(config: CrawlConfig, position: CrawlPosition) -> Self {
        let store = Self::default();
        *guard(&store.state) = Some(PersistedState::new(config, position));
        store
    }

    /// Makes every subsequent `save` fail (or succeed again)
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `upsert` fail (or succeed again)
    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Returns the stored record for an ID
    pub fn record(&self, id: u64) -> Option<PlayerRecord> {
        guard(&self.records).get(&id).cloned()
    }

    /// IDs of all stored records, ascending
    pub fn record_ids(&self) -> Vec<u64> {
        guard(&self.records).keys().copied().collect()
    }

    /// Number of `upsert` calls, successful or not
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// `current_id` of every successful save, in order
    pub fn saved_positions(&self) -> Vec<u64> {
        guard(&self.saved_positions).clone()
    }

    /// Recorded passes, oldest first
    pub fn passes(&self) -> Vec<PassRecord> {
        guard(&self.passes).clone()
    }
}

impl ProgressStore for MemoryStore {
    fn load(&self) -> StorageResult<Option<(CrawlConfig, CrawlPosition)>> {
        Ok(guard(&self.state)
            .as_ref()
            .map(|state| (state.config.clone(), state.position.clone())))
    }

    fn save(&self, config: &CrawlConfig, position: &CrawlPosition) -> StorageResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Database("injected save failure".to_string()));
        }
        *guard(&self.state) = Some(PersistedState::new(config.clone(), position.clone()));
        guard(&self.saved_positions).push(position.current_id);
        Ok(())
    }
}

impl ResultSink for MemoryStore {
    fn upsert(&self, id: u64, record: &PlayerRecord) -> StorageResult<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(StorageError::Database("injected upsert failure".to_string()));
        }
        guard(&self.records).insert(id, record.clone());
        Ok(())
    }
}

impl PassRecorder for MemoryStore {
    fn record_pass(&self, pass: &PassRecord) -> StorageResult<()> {
        guard(&self.passes).push(pass.clone());
        Ok(())
    }
}
