//! Engine lifecycle and the scheduler loop

use super::batch::{run_batch, BatchPlan, BatchReport, DispatchLimits, IdOutcome};
use super::{pass_interval, reposition, EngineDeps, EngineSettings};
use crate::client::QuotaSnapshot;
use crate::config::{compute_config_hash, validate_crawl_config, CrawlConfig};
use crate::state::{CrawlLogEntry, CrawlPosition, EngineState, LogAction, LogBuffer};
use crate::status::{build_status, CrawlStatus, EngineCounters, SpeedTracker};
use crate::storage::{PassRecord, StorageResult};
use crate::{CrawlerError, Result};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Everything readers may observe, guarded by one short-lived lock
struct Inner {
    state: EngineState,
    config: CrawlConfig,
    position: CrawlPosition,
    /// Reconfiguration waiting for the next batch boundary
    pending_config: Option<CrawlConfig>,
    error_detail: Option<String>,
    cancel: Option<CancellationToken>,
    logs: LogBuffer,
    counters: EngineCounters,
    speed: SpeedTracker,
    pass_tally: PassTally,
}

/// Totals for the pass in progress, as seen by this process
#[derive(Debug, Default)]
struct PassTally {
    ids_scanned: u64,
    records_found: u64,
}

struct Shared {
    deps: EngineDeps,
    settings: EngineSettings,
    inner: Mutex<Inner>,
    config_changed: Notify,
}

/// Consistent copy of the engine's observable state
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub config: CrawlConfig,
    pub status: CrawlStatus,
    pub counters: EngineCounters,
    /// Newest first
    pub recent_logs: Vec<CrawlLogEntry>,
}

/// Background crawler over the configured ID range
///
/// One scheduler loop runs per engine while it is `Running`. Operators drive it through
/// [`start`](Self::start), [`pause`](Self::pause) and [`reconfigure`](Self::reconfigure);
/// [`status`](Self::status) never blocks on the loop.
pub struct CrawlEngine {
    shared: Arc<Shared>,
    /// Serializes lifecycle changes and owns the loop's handle
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CrawlEngine {
    /// Creates an idle engine
    ///
    /// Nothing is loaded until [`init`](Self::init) is called.
    pub fn new(deps: EngineDeps, settings: EngineSettings) -> Self {
        let defaults = settings.defaults.clone();
        let inner = Inner {
            state: EngineState::Idle,
            position: CrawlPosition::new(defaults.id_range.start),
            config: defaults,
            pending_config: None,
            error_detail: None,
            cancel: None,
            logs: LogBuffer::new(settings.log_capacity),
            counters: EngineCounters::default(),
            speed: SpeedTracker::new(settings.speed_window, Instant::now()),
            pass_tally: PassTally::default(),
        };

        Self {
            shared: Arc::new(Shared {
                deps,
                settings,
                inner: Mutex::new(inner),
                config_changed: Notify::new(),
            }),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Loads persisted state and starts crawling if the configuration is enabled
    ///
    /// On first boot the default configuration is persisted, positioned at the start of its
    /// range.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - State loaded (and the loop started when enabled)
    /// * `Err(CrawlerError)` - The store could not be read or written, or holds an invalid
    ///   configuration
    pub async fn init(&self) -> Result<()> {
        let (config, position) = self
            .shared
            .deps
            .progress
            .load_or_default(&self.shared.settings.defaults)?;
        validate_crawl_config(&config)?;

        let position = reposition(&position, &config);
        self.shared.deps.progress.save(&config, &position)?;

        tracing::info!(
            "Loaded crawl state: IDs {}-{}, next ID {}, enabled={}",
            config.id_range.start,
            config.id_range.end,
            position.current_id,
            config.enabled
        );

        let enabled = config.enabled;
        {
            let mut inner = self.shared.lock();
            inner.config = config;
            inner.position = position;
            inner.state = EngineState::Idle;
        }

        if enabled {
            self.start().await?;
        }
        Ok(())
    }

    /// Starts the scheduler loop from the persisted position
    ///
    /// Accepted from `Idle`, `Paused` and `Error`; a no-op while already running.
    pub async fn start(&self) -> Result<()> {
        let mut task = self.task.lock().await;

        if self.state() == EngineState::Running {
            tracing::debug!("Start requested while already running");
            return Ok(());
        }

        // A loop that stopped on its own (error) has already returned
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                tracing::error!("Crawl loop ended abnormally: {}", e);
            }
        }

        let cancel = CancellationToken::new();
        let current_id = {
            let mut inner = self.shared.lock();
            let from = inner.state;
            if !from.can_start() {
                return Err(CrawlerError::InvalidTransition {
                    from,
                    to: EngineState::Running,
                });
            }

            let current_id = inner.position.current_id;
            inner.state = EngineState::Running;
            inner.error_detail = None;
            inner.cancel = Some(cancel.clone());
            inner.speed.reset(Instant::now());
            inner
                .logs
                .push(LogAction::Start, format!("Started at ID {}", current_id), true);
            current_id
        };

        tracing::info!("Crawl started at ID {}", current_id);
        *task = Some(tokio::spawn(run_loop(self.shared.clone(), cancel)));
        Ok(())
    }

    /// Stops the loop and persists the resolved position
    ///
    /// Requests already sent are allowed to finish and their batch is committed. Waits for a
    /// quota slot, pacing delays and backoffs are abandoned; IDs they covered are fetched
    /// again on the next start. A no-op when already paused.
    pub async fn pause(&self) -> Result<()> {
        let mut task = self.task.lock().await;

        let cancel = {
            let mut inner = self.shared.lock();
            match inner.state {
                EngineState::Running => inner.cancel.take(),
                EngineState::Paused => return Ok(()),
                from => {
                    return Err(CrawlerError::InvalidTransition {
                        from,
                        to: EngineState::Paused,
                    })
                }
            }
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                tracing::error!("Crawl loop ended abnormally: {}", e);
            }
        }

        let current_id = {
            let mut inner = self.shared.lock();
            // The loop may have failed while winding down
            if inner.state == EngineState::Running {
                inner.state = EngineState::Paused;
            }
            let current_id = inner.position.current_id;
            let state = inner.state;
            inner.logs.push(
                LogAction::Pause,
                format!("Paused at ID {}", current_id),
                state == EngineState::Paused,
            );
            current_id
        };
        tracing::info!("Crawl paused at ID {}", current_id);

        self.shared.apply_pending()?;
        Ok(())
    }

    /// Validates and applies a new crawl configuration
    ///
    /// While the loop runs the change is queued for the next batch boundary; otherwise it is
    /// persisted immediately. A position outside the new range restarts at its start.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Applied or queued
    /// * `Err(CrawlerError::Validation)` - Rejected; state and configuration are unchanged
    /// * `Err(CrawlerError::Storage)` - Could not be persisted; nothing was applied
    pub async fn reconfigure(&self, config: CrawlConfig) -> Result<()> {
        if let Err(e) = validate_crawl_config(&config) {
            tracing::warn!("Rejected crawl configuration: {}", e);
            self.shared
                .lock()
                .logs
                .push(LogAction::Reconfigure, format!("Rejected: {}", e), false);
            return Err(e.into());
        }

        // The loop cannot start while this is held
        let _task = self.task.lock().await;

        let position = {
            let mut inner = self.shared.lock();
            if inner.state == EngineState::Running {
                inner.pending_config = Some(config);
                inner.logs.push(
                    LogAction::Reconfigure,
                    "Queued for the next batch boundary",
                    true,
                );
                drop(inner);
                self.shared.config_changed.notify_one();
                return Ok(());
            }
            reposition(&inner.position, &config)
        };

        if let Err(e) = self.shared.deps.progress.save(&config, &position) {
            self.shared
                .log(LogAction::Reconfigure, format!("Failed to persist: {}", e), false);
            return Err(e.into());
        }

        let details = describe_config(&config);
        tracing::info!("Applied crawl configuration: {}", details);
        let mut inner = self.shared.lock();
        inner.config = config;
        inner.position = position;
        inner.pending_config = None;
        inner.logs.push(LogAction::Reconfigure, details, true);
        Ok(())
    }

    /// Clears an error so the engine reads as idle again
    pub fn acknowledge_error(&self) -> Result<()> {
        let mut inner = self.shared.lock();
        if !inner.state.can_transition_to(EngineState::Idle) {
            return Err(CrawlerError::InvalidTransition {
                from: inner.state,
                to: EngineState::Idle,
            });
        }
        inner.state = EngineState::Idle;
        inner.error_detail = None;
        Ok(())
    }

    /// Stops the loop for process exit
    ///
    /// Unlike an operator pause, the persisted `enabled` flag is left as is, so the next
    /// boot behaves as this one did.
    pub async fn shutdown(&self) {
        match self.pause().await {
            Ok(()) | Err(CrawlerError::InvalidTransition { .. }) => {}
            Err(e) => tracing::warn!("Error while shutting down: {}", e),
        }

        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                tracing::error!("Crawl loop ended abnormally: {}", e);
            }
        }
    }

    pub fn state(&self) -> EngineState {
        self.shared.lock().state
    }

    /// The configuration currently applied
    pub fn config(&self) -> CrawlConfig {
        self.shared.lock().config.clone()
    }

    pub fn position(&self) -> CrawlPosition {
        self.shared.lock().position.clone()
    }

    pub fn counters(&self) -> EngineCounters {
        self.shared.lock().counters.clone()
    }

    pub fn recent_logs(&self, limit: usize) -> Vec<CrawlLogEntry> {
        self.shared.lock().logs.recent(limit)
    }

    /// Current progress; never waits for the loop
    pub fn status(&self) -> CrawlStatus {
        self.shared.status(&self.shared.lock())
    }

    /// Configuration, status, counters and logs read together
    pub fn snapshot(&self, log_limit: usize) -> EngineSnapshot {
        let inner = self.shared.lock();
        EngineSnapshot {
            config: inner.config.clone(),
            status: self.shared.status(&inner),
            counters: inner.counters.clone(),
            recent_logs: inner.logs.recent(log_limit),
        }
    }

    pub fn quota_snapshot(&self) -> QuotaSnapshot {
        self.shared.deps.fetcher.quota_snapshot()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self, inner: &Inner) -> CrawlStatus {
        let speed = if inner.state == EngineState::Running {
            inner.speed.ids_per_minute(Instant::now())
        } else {
            None
        };
        build_status(
            inner.state,
            &inner.config,
            &inner.position,
            speed,
            inner.error_detail.clone(),
        )
    }

    fn log(&self, action: LogAction, details: impl Into<String>, success: bool) {
        self.lock().logs.push(action, details, success);
    }

    /// Stops the loop in the `Error` state, keeping the last persisted position
    fn fail(&self, detail: String) {
        tracing::error!("Crawl halted: {}", detail);
        let mut inner = self.lock();
        inner.state = EngineState::Error;
        inner.cancel = None;
        inner.logs.push(LogAction::Persist, detail.clone(), false);
        inner.error_detail = Some(detail);
    }

    /// Applies a queued reconfiguration, persisting it first
    fn apply_pending(&self) -> StorageResult<()> {
        let (config, position) = {
            let mut inner = self.lock();
            let Some(config) = inner.pending_config.take() else {
                return Ok(());
            };
            let position = reposition(&inner.position, &config);
            (config, position)
        };

        if let Err(e) = self.deps.progress.save(&config, &position) {
            let mut inner = self.lock();
            if inner.pending_config.is_none() {
                inner.pending_config = Some(config);
            }
            return Err(e);
        }

        let details = describe_config(&config);
        tracing::info!("Applied crawl configuration: {}", details);
        let mut inner = self.lock();
        inner.config = config;
        inner.position = position;
        inner.logs.push(LogAction::Reconfigure, details, true);
        Ok(())
    }

    fn current(&self) -> (CrawlConfig, CrawlPosition) {
        let inner = self.lock();
        (inner.config.clone(), inner.position.clone())
    }

    /// Folds per-ID outcomes into counters and the operator log
    fn tally(&self, report: &BatchReport) {
        let mut inner = self.lock();
        for (id, outcome) in &report.outcomes {
            match outcome {
                IdOutcome::Abandoned => continue,
                IdOutcome::Found(_) => inner.counters.succeeded += 1,
                IdOutcome::NotFound => inner.counters.not_found += 1,
                IdOutcome::Failed(msg) => {
                    inner.counters.failed += 1;
                    inner
                        .logs
                        .push(LogAction::Fetch, format!("ID {}: {}", id, msg), false);
                }
                IdOutcome::RateLimited(_) => inner.counters.rate_limited += 1,
            }
            inner.counters.attempted += 1;
        }

        if let Some(delay) = report.rate_limit {
            inner.logs.push(
                LogAction::RateLimit,
                format!("Rate limited, backing off {}s", delay.as_secs()),
                false,
            );
        }
    }

    /// Persists the position reached by a batch, then adopts it in memory
    ///
    /// Completing the range wraps the position to the start and schedules the next pass.
    fn commit(
        &self,
        config: &CrawlConfig,
        position: &CrawlPosition,
        resolved_until: u64,
        records_written: u64,
        records_found: u64,
        batch_started: DateTime<Utc>,
    ) -> std::result::Result<(), String> {
        let now = Utc::now();
        let advanced = resolved_until.saturating_sub(position.current_id);

        let mut next = position.clone();
        next.current_id = resolved_until;
        next.last_run_timestamp = Some(now);
        next.next_scheduled_run = None;
        if next.pass_started_at.is_none() {
            next.pass_started_at = Some(batch_started);
        }

        let pass_done = resolved_until > config.id_range.end;
        let mut pass_started = None;
        if pass_done {
            next.current_id = config.id_range.start;
            next.last_completed_run = Some(now);
            next.next_scheduled_run = Some(now + pass_interval(config));
            pass_started = next.pass_started_at.take();
        }

        self.deps
            .progress
            .save(config, &next)
            .map_err(|e| format!("Failed to persist position {}: {}", resolved_until, e))?;

        let tally = {
            let mut inner = self.lock();
            inner.position = next.clone();
            inner.speed.record(Instant::now(), advanced);
            inner.counters.records_written += records_written;
            inner.counters.batches_completed += 1;
            inner.pass_tally.ids_scanned += advanced;
            inner.pass_tally.records_found += records_found;

            if pass_done {
                inner.counters.passes_completed += 1;
                let tally = std::mem::take(&mut inner.pass_tally);
                inner.logs.push(
                    LogAction::PassComplete,
                    format!(
                        "Pass complete: {} IDs scanned, {} records",
                        tally.ids_scanned, tally.records_found
                    ),
                    true,
                );
                Some(tally)
            } else {
                None
            }
        };

        if let Some(tally) = tally {
            tracing::info!(
                "Pass complete: {} IDs scanned, {} records found; next pass at {}",
                tally.ids_scanned,
                tally.records_found,
                next.next_scheduled_run.map(|t| t.to_rfc3339()).unwrap_or_default()
            );
            self.record_pass(config, pass_started.unwrap_or(now), now, tally);
        }

        Ok(())
    }

    fn record_pass(
        &self,
        config: &CrawlConfig,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        tally: PassTally,
    ) {
        let Some(history) = &self.deps.history else {
            return;
        };

        let pass = PassRecord {
            started_at,
            finished_at,
            ids_scanned: tally.ids_scanned,
            records_found: tally.records_found,
            config_hash: compute_config_hash(config),
        };
        if let Err(e) = history.record_pass(&pass) {
            tracing::warn!("Failed to record pass history: {}", e);
        }
    }
}

fn describe_config(config: &CrawlConfig) -> String {
    format!(
        "IDs {}-{}, batch {}, {} concurrent, {}ms delay, every {}min",
        config.id_range.start,
        config.id_range.end,
        config.batch_size,
        config.max_concurrent_requests,
        config.request_delay_ms,
        config.interval_minutes
    )
}

/// What the loop should do after one step
enum Flow {
    Continue,
    Cancelled,
}

enum Wait {
    Due,
    Reconfigured,
    Cancelled,
}

async fn run_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    tracing::debug!("Crawl loop running");

    while !cancel.is_cancelled() {
        match step(&shared, &cancel).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Cancelled) => break,
            Err(detail) => {
                shared.fail(detail);
                return;
            }
        }
    }

    tracing::debug!("Crawl loop stopped");
}

/// Runs one batch, or waits for the next pass when the last one just completed
async fn step(shared: &Shared, cancel: &CancellationToken) -> std::result::Result<Flow, String> {
    shared
        .apply_pending()
        .map_err(|e| format!("Failed to persist new configuration: {}", e))?;

    let (config, position) = shared.current();

    if let Some(next_run) = position.next_scheduled_run {
        match wait_for_next_pass(shared, next_run, cancel).await {
            Wait::Due => tracing::info!("Starting pass over IDs {}-{}", config.id_range.start, config.id_range.end),
            Wait::Reconfigured => return Ok(Flow::Continue),
            Wait::Cancelled => return Ok(Flow::Cancelled),
        }
    }

    let batch_started = Utc::now();
    let Some(plan) = BatchPlan::next(&config, position.current_id) else {
        // Position already past the end: close the pass without fetching
        shared.commit(&config, &position, config.id_range.end + 1, 0, 0, batch_started)?;
        return Ok(Flow::Continue);
    };

    let limits = DispatchLimits::new(&config, shared.settings.max_transient_retries);
    let report = run_batch(shared.deps.fetcher.clone(), plan, limits, cancel).await;
    shared.tally(&report);

    // Records are written in ID order; a failed write truncates the resolved prefix.
    // Records past the prefix are stored as well, though their IDs will be fetched again.
    let mut resolved_until = report.resolved_until(&plan);
    let mut written = 0;
    let mut found = 0;
    let mut sink_failure = None;
    for (id, outcome) in &report.outcomes {
        let IdOutcome::Found(record) = outcome else {
            continue;
        };
        if let Err(e) = shared.deps.sink.upsert(*id, record) {
            sink_failure = Some(format!("Failed to store record for ID {}: {}", id, e));
            resolved_until = resolved_until.min(*id);
            break;
        }
        written += 1;
        if *id < resolved_until {
            found += 1;
        }
    }

    shared.commit(&config, &position, resolved_until, written, found, batch_started)?;

    tracing::debug!(
        "Batch {}-{}: resolved up to {}, {} records written, {} retries",
        plan.first,
        plan.last,
        resolved_until,
        written,
        report.retries
    );
    shared.log(
        LogAction::Batch,
        format!(
            "IDs {}-{}: advanced to {}, {} records",
            plan.first, plan.last, resolved_until, written
        ),
        true,
    );

    if let Some(detail) = sink_failure {
        return Err(detail);
    }

    if let Some(delay) = report.rate_limit {
        tracing::warn!("Rate limited; backing off for {:?}", delay);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(Flow::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }

    Ok(Flow::Continue)
}

async fn wait_for_next_pass(
    shared: &Shared,
    next_run: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Wait {
    let remaining = (next_run - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    if remaining.is_zero() {
        return Wait::Due;
    }

    tracing::info!("Next pass scheduled at {}", next_run.to_rfc3339());
    tokio::select! {
        _ = cancel.cancelled() => Wait::Cancelled,
        _ = shared.config_changed.notified() => Wait::Reconfigured,
        _ = tokio::time::sleep(remaining) => Wait::Due,
    }
}
