use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Trailing-window moving average of IDs advanced per minute
#[derive(Debug, Clone)]
pub struct SpeedTracker {
    window: Duration,
    started_at: Instant,
    samples: VecDeque<(Instant, u64)>,
}

impl SpeedTracker {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            started_at: now,
            samples: VecDeque::new(),
        }
    }

    /// Forgets all samples; measuring restarts at `now`
    pub fn reset(&mut self, now: Instant) {
        self.started_at = now;
        self.samples.clear();
    }

    /// Records that `advanced` IDs were resolved at `now`
    pub fn record(&mut self, now: Instant, advanced: u64) {
        self.samples.push_back((now, advanced));
        while let Some(&(at, _)) = self.samples.front() {
            if now.saturating_duration_since(at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// IDs per minute over the trailing window ending at `now`
    ///
    /// Returns `None` until some time has elapsed since measuring began.
    pub fn ids_per_minute(&self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.started_at).min(self.window);
        if elapsed.is_zero() {
            return None;
        }

        let advanced: u64 = self
            .samples
            .iter()
            .filter(|(at, _)| now.saturating_duration_since(*at) <= self.window)
            .map(|(_, n)| n)
            .sum();

        Some(advanced as f64 / (elapsed.as_secs_f64() / 60.0))
    }
}
