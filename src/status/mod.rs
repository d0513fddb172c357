//! Status reporting
//!
//! Derives operator-facing metrics (percent complete, speed, time remaining) from engine
//! state on demand. Nothing here owns state; everything is recomputed on read.

mod reporter;
mod speed;

pub use reporter::{build_status, derive_stats};
pub use speed::SpeedTracker;

use crate::state::EngineState;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Snapshot of the crawl as seen by operators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlStatus {
    pub state: EngineState,

    /// IDs resolved in the current pass
    pub indexed_count: u64,

    /// IDs in one pass
    pub total_count: u64,

    pub percent_complete: f64,

    /// Next ID to attempt
    pub current_id: u64,

    /// Moving average of IDs advanced per minute; `None` before any sample
    pub speed: Option<f64>,

    /// `None` while the speed is unknown or zero
    #[serde(serialize_with = "serialize_eta")]
    pub estimated_time_remaining: Option<Duration>,

    pub next_scheduled_run: Option<DateTime<Utc>>,
    pub last_completed_run: Option<DateTime<Utc>>,
    pub last_run_timestamp: Option<DateTime<Utc>>,
    pub error_detail: Option<String>,
}

/// Running totals kept by the engine since process start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineCounters {
    pub attempted: u64,
    pub succeeded: u64,
    pub not_found: u64,
    pub failed: u64,
    pub rate_limited: u64,
    pub records_written: u64,
    pub batches_completed: u64,
    pub passes_completed: u64,
}

/// Aggregates shown in the detailed status view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedStats {
    #[serde(flatten)]
    pub counters: EngineCounters,

    /// Share of attempts that resolved cleanly (success or not-found), 0-100
    pub success_rate: f64,

    pub percent_complete: f64,

    pub ids_remaining: u64,
}

fn serialize_eta<S: Serializer>(eta: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match eta {
        Some(duration) => serializer.serialize_u64(duration.as_secs()),
        None => serializer.serialize_str("calculating"),
    }
}
