//! Global request limiter
//!
//! A sliding-window log of grant instants: a slot is granted only while fewer than the
//! effective limit of grants lie inside the trailing window, so no window of that length
//! ever holds more than `max_calls` requests. A rate-limit signal from the API sets a
//! cooldown and halves the effective limit until one full window after the cooldown.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct LimiterState {
    grants: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
    reduced_until: Option<Instant>,
}

/// Sliding-window limiter shared by every fetch path
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: u32,
    window: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_calls` per `window`
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            state: Mutex::new(LimiterState {
                grants: VecDeque::new(),
                cooldown_until: None,
                reduced_until: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn prune(&self, state: &mut LimiterState, now: Instant) {
        while let Some(&oldest) = state.grants.front() {
            if oldest + self.window <= now {
                state.grants.pop_front();
            } else {
                break;
            }
        }
    }

    fn effective_limit(&self, state: &LimiterState, now: Instant) -> u32 {
        match state.reduced_until {
            Some(until) if until > now => (self.max_calls / 2).max(1),
            _ => self.max_calls,
        }
    }

    /// Grants a slot at `now` or reports how long until one could be granted
    pub fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut state = self.state();
        self.prune(&mut state, now);

        if let Some(until) = state.cooldown_until {
            if until > now {
                return Err(until - now);
            }
            state.cooldown_until = None;
        }

        let limit = self.effective_limit(&state, now) as usize;
        if state.grants.len() < limit {
            state.grants.push_back(now);
            return Ok(());
        }

        // The slot frees once enough of the oldest grants leave the window
        let index = state.grants.len() - limit;
        let frees_at = state.grants[index] + self.window;
        Err(frees_at.saturating_duration_since(now).max(Duration::from_millis(1)))
    }

    /// Waits for a slot, giving up after `max_wait`
    ///
    /// # Returns
    ///
    /// * `Ok(())` - A slot was granted
    /// * `Err(Duration)` - No slot within `max_wait`; the value is the remaining wait
    pub async fn acquire(&self, max_wait: Duration) -> Result<(), Duration> {
        let deadline = Instant::now() + max_wait;

        loop {
            let now = Instant::now();
            match self.try_acquire_at(now) {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    if now + wait > deadline {
                        tracing::debug!("Rate-limit slot not available within {:?}", max_wait);
                        return Err(wait);
                    }
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Applies adaptive backoff after the API signalled a rate limit
    pub fn penalize(&self, retry_after: Duration) {
        let now = Instant::now();
        let mut state = self.state();

        let cooldown_until = now + retry_after;
        if state.cooldown_until.map_or(true, |until| until < cooldown_until) {
            state.cooldown_until = Some(cooldown_until);
        }
        state.reduced_until = Some(cooldown_until + self.window);

        tracing::warn!(
            "API rate limit signalled; cooling down for {:?}, send rate halved",
            retry_after
        );
    }

    /// Number of slots free right now
    pub fn remaining(&self) -> u32 {
        let now = Instant::now();
        let mut state = self.state();
        self.prune(&mut state, now);

        if state.cooldown_until.map_or(false, |until| until > now) {
            return 0;
        }
        let limit = self.effective_limit(&state, now);
        limit.saturating_sub(state.grants.len() as u32)
    }

    /// Returns true while a rate-limit cooldown is active
    pub fn is_cooling_down(&self) -> bool {
        let now = Instant::now();
        self.state()
            .cooldown_until
            .map_or(false, |until| until > now)
    }
}
