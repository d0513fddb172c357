use crate::config::CrawlConfig;
use crate::state::{CrawlPosition, EngineState};
use crate::status::{CrawlStatus, DerivedStats, EngineCounters};
use std::time::Duration;

/// Derives a [`CrawlStatus`] from engine state
///
/// Progress is counted per pass: `indexed_count` restarts at zero when a new pass begins.
/// While the engine waits for the next scheduled pass the previous one is reported as
/// complete.
pub fn build_status(
    state: EngineState,
    config: &CrawlConfig,
    position: &CrawlPosition,
    speed: Option<f64>,
    error_detail: Option<String>,
) -> CrawlStatus {
    let range = config.id_range;
    let total_count = range.len();

    let indexed_count = if position.is_awaiting_next_pass() {
        total_count
    } else {
        position
            .current_id
            .saturating_sub(range.start)
            .min(total_count)
    };

    let percent_complete = if total_count > 0 {
        indexed_count as f64 / total_count as f64 * 100.0
    } else {
        0.0
    };

    let remaining = total_count - indexed_count;
    let estimated_time_remaining = if remaining == 0 {
        Some(Duration::ZERO)
    } else {
        match speed {
            Some(per_minute) if per_minute > 0.0 => Some(Duration::from_secs_f64(
                remaining as f64 / per_minute * 60.0,
            )),
            _ => None,
        }
    };

    CrawlStatus {
        state,
        indexed_count,
        total_count,
        percent_complete,
        current_id: position.current_id,
        speed,
        estimated_time_remaining,
        next_scheduled_run: position.next_scheduled_run,
        last_completed_run: position.last_completed_run,
        last_run_timestamp: position.last_run_timestamp,
        error_detail,
    }
}

/// Aggregates counters into the detailed-status statistics
pub fn derive_stats(counters: &EngineCounters, status: &CrawlStatus) -> DerivedStats {
    let clean = counters.succeeded + counters.not_found;
    let success_rate = if counters.attempted > 0 {
        clean as f64 / counters.attempted as f64 * 100.0
    } else {
        0.0
    };

    DerivedStats {
        counters: counters.clone(),
        success_rate,
        percent_complete: status.percent_complete,
        ids_remaining: status.total_count - status.indexed_count,
    }
}
