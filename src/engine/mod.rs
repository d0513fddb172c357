//! Crawl engine
//!
//! This module contains the scheduling core of the crawler:
//! - The lifecycle state machine (`init`, `start`, `pause`, `reconfigure`, `shutdown`)
//! - The per-batch loop that advances and persists the crawl position
//! - Bounded-concurrency batch dispatch with pacing and transient retries
//!
//! The persisted position never runs ahead of what was actually scanned: the in-memory
//! position only moves after a successful save.

mod batch;
mod runner;
#[cfg(test)]
pub(crate) mod testing;

pub use runner::{CrawlEngine, EngineSnapshot};

use crate::client::RecordFetcher;
use crate::config::{CrawlConfig, Settings};
use crate::state::CrawlPosition;
use crate::storage::{PassRecorder, ProgressStore, ResultSink};
use std::sync::Arc;
use std::time::Duration;

/// Collaborators injected into the engine
#[derive(Clone)]
pub struct EngineDeps {
    pub fetcher: Arc<dyn RecordFetcher>,
    pub progress: Arc<dyn ProgressStore>,
    pub sink: Arc<dyn ResultSink>,
    /// Receives one entry per completed pass when present
    pub history: Option<Arc<dyn PassRecorder>>,
}

impl EngineDeps {
    /// Wires a single store that plays every storage role
    pub fn with_store<S>(fetcher: Arc<dyn RecordFetcher>, store: Arc<S>) -> Self
    where
        S: ProgressStore + ResultSink + PassRecorder + 'static,
    {
        Self {
            fetcher,
            progress: store.clone(),
            sink: store.clone(),
            history: Some(store),
        }
    }
}

/// Process-lifetime engine tuning
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Crawl configuration used when the progress store is empty
    pub defaults: CrawlConfig,

    /// Operator log entries retained
    pub log_capacity: usize,

    /// Trailing window of the speed moving average
    pub speed_window: Duration,

    /// Extra attempts for transiently failing IDs
    pub max_transient_retries: u32,
}

impl EngineSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            defaults: settings.crawl.clone(),
            log_capacity: settings.engine.log_capacity,
            speed_window: Duration::from_secs(settings.engine.speed_window_seconds),
            max_transient_retries: settings.engine.max_transient_retries,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            defaults: CrawlConfig::default(),
            log_capacity: 100,
            speed_window: Duration::from_secs(300),
            max_transient_retries: 3,
        }
    }
}

/// Fits a position to a (possibly new) configuration
///
/// A position outside the new range restarts at the range start, as does one waiting for
/// the next pass. While waiting, the next run is rescheduled from the last completed run
/// using the new interval.
pub(crate) fn reposition(position: &CrawlPosition, config: &CrawlConfig) -> CrawlPosition {
    let mut fitted = position.clone();
    let range = config.id_range;

    if fitted.is_awaiting_next_pass() {
        fitted.current_id = range.start;
        if let Some(completed) = fitted.last_completed_run {
            fitted.next_scheduled_run = Some(completed + pass_interval(config));
        }
    } else if !range.contains(fitted.current_id) {
        fitted.current_id = range.start;
        fitted.pass_started_at = None;
    }

    fitted
}

/// Longest pause between passes honored (one year)
const MAX_INTERVAL_MINUTES: u64 = 525_600;

/// Pause between two passes
pub(crate) fn pass_interval(config: &CrawlConfig) -> chrono::Duration {
    chrono::Duration::minutes(config.interval_minutes.min(MAX_INTERVAL_MINUTES) as i64)
}
