//! Operator-facing API
//!
//! Transport-agnostic request handlers over a shared [`CrawlEngine`]. Every response is
//! `serde::Serialize` so a routing layer can hand it straight to `serde_json`.

use crate::client::QuotaSnapshot;
use crate::config::CrawlConfig;
use crate::engine::CrawlEngine;
use crate::state::{CrawlLogEntry, EngineState};
use crate::status::{derive_stats, CrawlStatus, DerivedStats};
use crate::CrawlerError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Log entries included in the detailed status by default
pub const DEFAULT_LOG_LIMIT: usize = 20;

/// `GET status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: CrawlStatus,
    pub calls_per_hour: u64,
    pub uptime_percentage: f64,
    pub rate_limit_available: bool,
    pub last_error_time: Option<DateTime<Utc>>,
}

/// `GET detailed_status`
#[derive(Debug, Clone, Serialize)]
pub struct DetailedStatus {
    pub config: CrawlConfig,
    pub status: CrawlStatus,
    pub recent_logs: Vec<CrawlLogEntry>,
    pub derived_stats: DerivedStats,
    pub quota: QuotaSnapshot,
}

/// Acknowledgement of a lifecycle or configuration request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ack {
    /// Engine state after the request was handled
    pub state: EngineState,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// The configuration violates an invariant
    Validation,
    /// The request body could not be decoded
    BadRequest,
    /// The request is not allowed in the engine's current state
    InvalidState,
    /// Persisting the change failed
    Storage,
    Internal,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::BadRequest => "bad_request",
            Self::InvalidState => "invalid_state",
            Self::Storage => "storage",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<CrawlerError> for ApiError {
    fn from(err: CrawlerError) -> Self {
        let kind = match &err {
            CrawlerError::Validation(_) => ApiErrorKind::Validation,
            CrawlerError::Config(_) => ApiErrorKind::Validation,
            CrawlerError::InvalidTransition { .. } => ApiErrorKind::InvalidState,
            CrawlerError::Storage(_) | CrawlerError::Io(_) => ApiErrorKind::Storage,
            CrawlerError::Http(_) => ApiErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Handlers for the operator surface, cheap to clone
#[derive(Clone)]
pub struct OperatorApi {
    engine: Arc<CrawlEngine>,
}

impl OperatorApi {
    pub fn new(engine: Arc<CrawlEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<CrawlEngine> {
        &self.engine
    }

    /// Progress plus API health; always answers, whatever the engine state
    pub fn status(&self) -> StatusResponse {
        let quota = self.engine.quota_snapshot();
        StatusResponse {
            status: self.engine.status(),
            calls_per_hour: quota.calls_per_hour,
            uptime_percentage: quota.uptime_percentage,
            rate_limit_available: quota.rate_limit_available,
            last_error_time: quota.last_error_time,
        }
    }

    pub fn detailed_status(&self) -> DetailedStatus {
        let snapshot = self.engine.snapshot(DEFAULT_LOG_LIMIT);
        let derived_stats = derive_stats(&snapshot.counters, &snapshot.status);
        DetailedStatus {
            config: snapshot.config,
            status: snapshot.status,
            recent_logs: snapshot.recent_logs,
            derived_stats,
            quota: self.engine.quota_snapshot(),
        }
    }

    pub async fn start(&self) -> ApiResult<Ack> {
        let was_running = self.engine.state() == EngineState::Running;
        self.engine.start().await?;
        Ok(self.ack(if was_running {
            "already running"
        } else {
            "started"
        }))
    }

    pub async fn pause(&self) -> ApiResult<Ack> {
        let was_paused = self.engine.state() == EngineState::Paused;
        self.engine.pause().await?;
        Ok(self.ack(if was_paused { "already paused" } else { "paused" }))
    }

    /// Clears an `error` state back to `idle`
    pub fn acknowledge(&self) -> ApiResult<Ack> {
        self.engine.acknowledge_error()?;
        Ok(self.ack("error acknowledged"))
    }

    pub async fn configure(&self, config: CrawlConfig) -> ApiResult<Ack> {
        let queued = self.engine.state() == EngineState::Running;
        self.engine.reconfigure(config).await?;
        Ok(self.ack(if queued {
            "configuration queued for the next batch"
        } else {
            "configuration applied"
        }))
    }

    /// Applies a JSON configuration body
    ///
    /// Fields missing from the body keep their current values; `id_range`, when present,
    /// is replaced as a whole.
    pub async fn configure_json(&self, body: &str) -> ApiResult<Ack> {
        let patch: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| ApiError::new(ApiErrorKind::BadRequest, format!("Invalid JSON: {}", e)))?;
        let config = merge_config(&self.engine.config(), patch)?;
        self.configure(config).await
    }

    fn ack(&self, message: &str) -> Ack {
        Ack {
            state: self.engine.state(),
            message: message.to_string(),
        }
    }
}

fn merge_config(current: &CrawlConfig, patch: serde_json::Value) -> ApiResult<CrawlConfig> {
    let serde_json::Value::Object(fields) = patch else {
        return Err(ApiError::new(
            ApiErrorKind::BadRequest,
            "Configuration must be a JSON object",
        ));
    };

    let mut merged = serde_json::to_value(current)
        .map_err(|e| ApiError::new(ApiErrorKind::Internal, e.to_string()))?;
    if let serde_json::Value::Object(base) = &mut merged {
        base.extend(fields);
    }

    serde_json::from_value(merged).map_err(|e| {
        ApiError::new(
            ApiErrorKind::BadRequest,
            format!("Invalid configuration: {}", e),
        )
    })
}
