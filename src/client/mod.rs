//! Client module for the external player API
//!
//! This module contains:
//! - The global request limiter shared by every fetch
//! - Rolling quota/latency bookkeeping
//! - The HTTP client that classifies each response into a [`FetchOutcome`]

mod api;
mod limiter;
mod quota;

pub use api::{player_url, RateLimitedClient};
pub use limiter::RateLimiter;
pub use quota::{QuotaSnapshot, QuotaTracker};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A player's bazaar as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: u64,
    pub name: String,
    pub listings: Vec<Listing>,
}

/// One item offered in a player's bazaar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub item_id: u64,
    pub name: String,
    pub category: String,
    pub price: u64,
    pub quantity: u32,
    pub market_value: u64,
}

/// Result of fetching a single ID
///
/// Consumed immediately by the engine to decide between retry, skip and requeue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The ID exists and returned a record
    Success(PlayerRecord),

    /// The ID does not exist; counts as scanned
    NotFound,

    /// The quota is exhausted; retry the ID after the given delay
    RateLimited(Duration),

    /// Network error, timeout or server-side failure; worth retrying
    TransientError(String),

    /// Non-retryable failure for this ID (bad request, malformed payload)
    FatalError(String),
}

impl FetchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::NotFound => "not_found",
            Self::RateLimited(_) => "rate_limited",
            Self::TransientError(_) => "transient_error",
            Self::FatalError(_) => "fatal_error",
        }
    }
}

/// Anything that can fetch a record for an ID under the global quota
///
/// [`RateLimitedClient`] is the production implementation; tests substitute scripted
/// fetchers.
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    /// Waits a bounded time for a rate-limit slot
    ///
    /// `Err` carries how long until a slot frees up.
    async fn acquire_slot(&self) -> Result<(), Duration>;

    /// Sends the request for one ID; the caller already holds a slot
    async fn fetch_with_slot(&self, id: u64) -> FetchOutcome;

    /// Fetches one ID, acquiring a rate-limit slot first
    async fn fetch(&self, id: u64) -> FetchOutcome {
        match self.acquire_slot().await {
            Ok(()) => self.fetch_with_slot(id).await,
            Err(wait) => FetchOutcome::RateLimited(wait),
        }
    }

    /// Current quota usage and API health
    fn quota_snapshot(&self) -> QuotaSnapshot;
}
