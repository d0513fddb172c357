//! Rolling quota and latency bookkeeping
//!
//! Every completed API call leaves a sample; samples older than one hour are pruned. The
//! snapshot combines these with the limiter's free slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

const SAMPLE_HORIZON: Duration = Duration::from_secs(3600);

/// Point-in-time view of API usage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    /// Calls completed during the last hour
    pub calls_per_hour: u64,

    /// Limiter slots free right now
    pub remaining: u32,

    /// Mean response time over the last hour
    pub avg_response_time_ms: f64,

    /// When the API last failed or signalled a rate limit
    pub last_error_time: Option<DateTime<Utc>>,

    /// Share of calls in the last hour that got a usable answer (0-100)
    pub uptime_percentage: f64,

    /// True when a slot could be granted without waiting
    pub rate_limit_available: bool,
}

#[derive(Debug, Clone, Copy)]
struct CallSample {
    at: Instant,
    response_ms: u64,
    ok: bool,
}

#[derive(Debug, Default)]
struct TrackerState {
    samples: VecDeque<CallSample>,
    last_error_time: Option<DateTime<Utc>>,
}

/// Collects per-call samples for [`QuotaSnapshot`]
#[derive(Debug, Default)]
pub struct QuotaTracker {
    state: Mutex<TrackerState>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prune(state: &mut TrackerState, now: Instant) {
        while let Some(sample) = state.samples.front() {
            if now.saturating_duration_since(sample.at) > SAMPLE_HORIZON {
                state.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records a completed call
    pub fn record_call(&self, response_time: Duration, ok: bool) {
        let now = Instant::now();
        let mut state = self.state();
        state.samples.push_back(CallSample {
            at: now,
            response_ms: response_time.as_millis() as u64,
            ok,
        });
        Self::prune(&mut state, now);
    }

    /// Marks the current moment as the last API error
    pub fn record_error(&self) {
        self.state().last_error_time = Some(Utc::now());
    }

    /// Builds a snapshot, combining samples with the limiter's view
    pub fn snapshot(&self, remaining: u32, rate_limit_available: bool) -> QuotaSnapshot {
        let now = Instant::now();
        let mut state = self.state();
        Self::prune(&mut state, now);

        let calls = state.samples.len() as u64;
        let (total_ms, ok_calls) = state
            .samples
            .iter()
            .fold((0u64, 0u64), |(ms, ok), s| (ms + s.response_ms, ok + s.ok as u64));

        let (avg_response_time_ms, uptime_percentage) = if calls > 0 {
            (
                total_ms as f64 / calls as f64,
                ok_calls as f64 / calls as f64 * 100.0,
            )
        } else {
            (0.0, 100.0)
        };

        QuotaSnapshot {
            calls_per_hour: calls,
            remaining,
            avg_response_time_ms,
            last_error_time: state.last_error_time,
            uptime_percentage,
            rate_limit_available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let tracker = QuotaTracker::new();
        let snapshot = tracker.snapshot(10, true);

        assert_eq!(snapshot.calls_per_hour, 0);
        assert_eq!(snapshot.remaining, 10);
        assert_eq!(snapshot.uptime_percentage, 100.0);
        assert!(snapshot.last_error_time.is_none());
    }

    #[test]
    fn test_average_and_uptime() {
        let tracker = QuotaTracker::new();
        tracker.record_call(Duration::from_millis(100), true);
        tracker.record_call(Duration::from_millis(300), true);
        tracker.record_call(Duration::from_millis(200), false);
        tracker.record_call(Duration::from_millis(400), true);
        tracker.record_error();

        let snapshot = tracker.snapshot(0, false);
        assert_eq!(snapshot.calls_per_hour, 4);
        assert_eq!(snapshot.avg_response_time_ms, 250.0);
        assert_eq!(snapshot.uptime_percentage, 75.0);
        assert!(snapshot.last_error_time.is_some());
        assert!(!snapshot.rate_limit_available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_expire_after_an_hour() {
        let tracker = QuotaTracker::new();
        tracker.record_call(Duration::from_millis(50), true);

        tokio::time::advance(Duration::from_secs(3601)).await;
        tracker.record_call(Duration::from_millis(150), true);

        let snapshot = tracker.snapshot(1, true);
        assert_eq!(snapshot.calls_per_hour, 1);
        assert_eq!(snapshot.avg_response_time_ms, 150.0);
    }
}
