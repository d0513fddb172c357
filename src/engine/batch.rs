//! Batch dispatch
//!
//! Runs one contiguous slice of the ID range through the fetcher with bounded concurrency
//! and pacing, then reports per-ID outcomes in ID order. Nothing here touches storage; the
//! engine decides what to persist from the returned [`BatchReport`].

use crate::client::{FetchOutcome, PlayerRecord, RecordFetcher};
use crate::config::CrawlConfig;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Base unit of the linear backoff between transient retries
pub(crate) const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Inclusive slice of IDs processed together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchPlan {
    pub first: u64,
    pub last: u64,
}

impl BatchPlan {
    /// Plans the batch starting at `current_id`, clipped to the configured range
    ///
    /// Returns `None` when `current_id` is already past the end of the range.
    pub fn next(config: &CrawlConfig, current_id: u64) -> Option<Self> {
        let range = config.id_range;
        let first = current_id.max(range.start);
        if first > range.end {
            return None;
        }
        let span = u64::from(config.batch_size.max(1)) - 1;
        let last = first.saturating_add(span).min(range.end);
        Some(Self { first, last })
    }
}

/// How a single ID ended up within a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IdOutcome {
    Found(PlayerRecord),
    NotFound,
    /// Fatal error, or transient errors that outlasted the retry bound
    Failed(String),
    /// Quota exhausted; the ID must be attempted again
    RateLimited(Duration),
    /// Cancelled before it resolved
    Abandoned,
}

impl IdOutcome {
    /// True if the ID counts as scanned for this pass
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Found(_) | Self::NotFound | Self::Failed(_))
    }
}

/// Per-ID results of one batch
#[derive(Debug, Default)]
pub(crate) struct BatchReport {
    /// Outcomes of every dispatched ID, keyed by ID
    pub outcomes: BTreeMap<u64, IdOutcome>,

    /// Longest backoff requested by a rate-limit signal during the batch
    pub rate_limit: Option<Duration>,

    /// Transient retries performed across the batch
    pub retries: u64,
}

impl BatchReport {
    /// First ID of the plan that did not resolve, or one past the plan if all did
    ///
    /// Every ID below the returned value resolved, so the position may advance to it.
    pub fn resolved_until(&self, plan: &BatchPlan) -> u64 {
        for id in plan.first..=plan.last {
            match self.outcomes.get(&id) {
                Some(outcome) if outcome.is_resolved() => {}
                _ => return id,
            }
        }
        plan.last + 1
    }
}

/// Limits shared by every fetch of a batch
#[derive(Debug, Clone, Copy)]
pub(crate) struct DispatchLimits {
    pub max_concurrent: usize,
    pub request_delay: Duration,
    pub max_retries: u32,
}

impl DispatchLimits {
    pub fn new(config: &CrawlConfig, max_retries: u32) -> Self {
        Self {
            max_concurrent: config.max_concurrent_requests.max(1) as usize,
            request_delay: Duration::from_millis(config.request_delay_ms),
            max_retries,
        }
    }
}

/// Fetches every ID of `plan`
///
/// IDs are dispatched in ascending order with at most `max_concurrent` in flight and at
/// least `request_delay` between two dispatches. A rate-limit signal stops further
/// dispatches; IDs already in flight still complete. Cancelling `cancel` stops dispatching
/// and abandons IDs still waiting for a quota slot or a retry backoff. Requests already sent
/// run to completion, bounded by the client's request timeout.
///
/// # Arguments
///
/// * `fetcher` - Source of records, already rate limited
/// * `plan` - IDs to fetch
/// * `limits` - Concurrency, pacing and retry bounds
/// * `cancel` - Pause/shutdown signal
pub(crate) async fn run_batch(
    fetcher: Arc<dyn RecordFetcher>,
    plan: BatchPlan,
    limits: DispatchLimits,
    cancel: &CancellationToken,
) -> BatchReport {
    let semaphore = Arc::new(Semaphore::new(limits.max_concurrent));
    let halted = CancellationToken::new();
    let rate_limit: Arc<Mutex<Option<Duration>>> = Arc::new(Mutex::new(None));
    let mut tasks = JoinSet::new();

    for id in plan.first..=plan.last {
        if id > plan.first && !limits.request_delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = halted.cancelled() => break,
                _ = tokio::time::sleep(limits.request_delay) => {}
            }
        }

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = halted.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        // A signal may have arrived while we waited for the permit
        if halted.is_cancelled() || cancel.is_cancelled() {
            break;
        }

        let fetcher = fetcher.clone();
        let cancel = cancel.clone();
        let halted = halted.clone();
        let rate_limit = rate_limit.clone();
        tasks.spawn(async move {
            let (outcome, retries) = resolve_id(fetcher.as_ref(), id, limits.max_retries, &cancel).await;
            if let IdOutcome::RateLimited(delay) = outcome {
                let mut slot = rate_limit.lock().unwrap_or_else(PoisonError::into_inner);
                *slot = Some(slot.map_or(delay, |current| current.max(delay)));
                halted.cancel();
            }
            drop(permit);
            (id, outcome, retries)
        });
    }

    let mut report = BatchReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, outcome, retries)) => {
                report.retries += u64::from(retries);
                report.outcomes.insert(id, outcome);
            }
            Err(e) => tracing::error!("Fetch task failed: {}", e),
        }
    }

    report.rate_limit = *rate_limit.lock().unwrap_or_else(PoisonError::into_inner);
    report
}

/// Fetches one ID, retrying transient failures with linear backoff
async fn resolve_id(
    fetcher: &dyn RecordFetcher,
    id: u64,
    max_retries: u32,
    cancel: &CancellationToken,
) -> (IdOutcome, u32) {
    let mut retries = 0;

    loop {
        let slot = tokio::select! {
            _ = cancel.cancelled() => return (IdOutcome::Abandoned, retries),
            slot = fetcher.acquire_slot() => slot,
        };
        let outcome = match slot {
            Ok(()) => fetcher.fetch_with_slot(id).await,
            Err(wait) => FetchOutcome::RateLimited(wait),
        };
        tracing::trace!("ID {}: {}", id, outcome.label());

        let resolved = match outcome {
            FetchOutcome::Success(record) => IdOutcome::Found(record),
            FetchOutcome::NotFound => IdOutcome::NotFound,
            FetchOutcome::RateLimited(delay) => IdOutcome::RateLimited(delay),
            FetchOutcome::FatalError(msg) => IdOutcome::Failed(msg),
            FetchOutcome::TransientError(msg) => {
                if retries >= max_retries {
                    IdOutcome::Failed(format!("{} (after {} retries)", msg, retries))
                } else {
                    retries += 1;
                    tracing::debug!("Transient error for ID {} (retry {}): {}", id, retries, msg);
                    tokio::select! {
                        _ = cancel.cancelled() => return (IdOutcome::Abandoned, retries),
                        _ = tokio::time::sleep(RETRY_BACKOFF * retries) => {}
                    }
                    continue;
                }
            }
        };

        return (resolved, retries);
    }
}
