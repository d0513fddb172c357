//! Scripted fetcher shared by engine tests

use crate::client::{FetchOutcome, PlayerRecord, QuotaSnapshot, RecordFetcher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Answers from a per-ID queue of outcomes; unscripted IDs are not found
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    script: Mutex<HashMap<u64, Vec<FetchOutcome>>>,
    calls: Mutex<Vec<(u64, Instant)>>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    latency: Duration,
    slot_wait: Duration,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Every slot takes `wait` to become available
    pub fn with_slot_wait(wait: Duration) -> Self {
        Self {
            slot_wait: wait,
            ..Self::default()
        }
    }

    pub fn script(&self, id: u64, outcomes: Vec<FetchOutcome>) {
        self.script.lock().unwrap().insert(id, outcomes);
    }

    /// Every fetched ID in call order, retries included
    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    /// When each request was sent, in call order
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl RecordFetcher for ScriptedFetcher {
    async fn acquire_slot(&self) -> Result<(), Duration> {
        if !self.slot_wait.is_zero() {
            tokio::time::sleep(self.slot_wait).await;
        }
        Ok(())
    }

    async fn fetch_with_slot(&self, id: u64) -> FetchOutcome {
        self.calls.lock().unwrap().push((id, Instant::now()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = {
            let mut script = self.script.lock().unwrap();
            match script.get_mut(&id) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => FetchOutcome::NotFound,
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn quota_snapshot(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            remaining: 100,
            rate_limit_available: true,
            ..QuotaSnapshot::default()
        }
    }
}

pub(crate) fn record(id: u64) -> PlayerRecord {
    PlayerRecord {
        player_id: id,
        name: format!("player{}", id),
        listings: Vec::new(),
    }
}
