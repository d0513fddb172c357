//! HTTP client for the player API
//!
//! This module handles all requests to the external API, including:
//! - Building the HTTP client with a bounded timeout
//! - Acquiring a slot from the global limiter before every call
//! - Classifying HTTP statuses and API error payloads into [`FetchOutcome`]s
//! - Feeding response times and failures into the quota tracker
//!
//! # Classification
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | HTTP 429, API error code 5 | RateLimited |
//! | HTTP 404, API error code 6 or 7 | NotFound |
//! | HTTP 5xx, timeout, connection error, API error code 8/9/17 | TransientError |
//! | Other HTTP 4xx, other API error codes, malformed payload | FatalError |

use crate::client::limiter::RateLimiter;
use crate::client::quota::{QuotaSnapshot, QuotaTracker};
use crate::client::{FetchOutcome, Listing, PlayerRecord, RecordFetcher};
use crate::config::ApiConfig;
use crate::{ConfigError, CrawlerError};
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Raw API response body
#[derive(Debug, Deserialize)]
struct ApiPayload {
    error: Option<ApiErrorBody>,
    name: Option<String>,
    #[serde(default)]
    bazaar: Option<Vec<BazaarItem>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct BazaarItem {
    #[serde(rename = "ID")]
    id: u64,
    name: String,
    #[serde(rename = "type", default)]
    category: String,
    quantity: u32,
    price: u64,
    #[serde(default)]
    market_price: u64,
}

/// Client for the external API, gated by the global limiter
pub struct RateLimitedClient {
    http: Client,
    base_url: Url,
    key: String,
    limiter: RateLimiter,
    quota: QuotaTracker,
    request_timeout: Duration,
    max_acquire_wait: Duration,
    default_cooldown: Duration,
}

impl RateLimitedClient {
    /// Builds a client from the `[api]` settings section
    ///
    /// # Returns
    ///
    /// * `Ok(RateLimitedClient)` - Ready-to-use client
    /// * `Err(CrawlerError)` - Bad base URL or the HTTP client could not be built
    pub fn new(config: &ApiConfig) -> Result<Self, CrawlerError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid base_url '{}': {}", config.base_url, e))
        })?;

        let request_timeout = Duration::from_millis(config.request_timeout_ms);
        let http = Client::builder()
            .user_agent(concat!("bazaar-crawler/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(Duration::from_secs(10)))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            http,
            base_url,
            key: config.key.clone(),
            limiter: RateLimiter::new(
                config.max_calls,
                Duration::from_secs(config.window_seconds),
            ),
            quota: QuotaTracker::new(),
            request_timeout,
            max_acquire_wait: Duration::from_millis(config.max_acquire_wait_ms),
            default_cooldown: Duration::from_secs(config.rate_limit_cooldown_seconds),
        })
    }

    /// The limiter every fetch goes through
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    async fn request(&self, id: u64) -> FetchOutcome {
        let url = player_url(&self.base_url, id, &self.key);

        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => return classify_transport_error(&e),
        };

        self.classify_response(id, response).await
    }

    async fn classify_response(&self, id: u64, response: Response) -> FetchOutcome {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(self.default_cooldown);
            return FetchOutcome::RateLimited(retry_after);
        }

        if status == StatusCode::NOT_FOUND {
            return FetchOutcome::NotFound;
        }

        if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            return FetchOutcome::TransientError(format!("HTTP {}", status.as_u16()));
        }

        if !status.is_success() {
            return FetchOutcome::FatalError(format!("HTTP {}", status.as_u16()));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return classify_transport_error(&e),
        };

        classify_payload(id, &body, self.default_cooldown)
    }
}

#[async_trait]
impl RecordFetcher for RateLimitedClient {
    async fn acquire_slot(&self) -> Result<(), Duration> {
        self.limiter.acquire(self.max_acquire_wait).await
    }

    async fn fetch_with_slot(&self, id: u64) -> FetchOutcome {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.request_timeout, self.request(id)).await {
            Ok(outcome) => outcome,
            Err(_) => FetchOutcome::TransientError("request timed out".to_string()),
        };

        let ok = !matches!(outcome, FetchOutcome::TransientError(_));
        self.quota.record_call(started.elapsed(), ok);

        match &outcome {
            FetchOutcome::RateLimited(retry_after) => {
                self.quota.record_error();
                self.limiter.penalize(*retry_after);
            }
            FetchOutcome::TransientError(reason) | FetchOutcome::FatalError(reason) => {
                self.quota.record_error();
                tracing::debug!("Fetch for id {} failed: {}", id, reason);
            }
            _ => {}
        }

        outcome
    }

    fn quota_snapshot(&self) -> QuotaSnapshot {
        let remaining = self.limiter.remaining();
        self.quota.snapshot(remaining, remaining > 0)
    }
}

/// Builds the request URL for a player ID
pub fn player_url(base_url: &Url, id: u64, key: &str) -> Url {
    let mut url = base_url.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("user").push(&id.to_string());
    }
    url.query_pairs_mut()
        .clear()
        .append_pair("selections", "profile,bazaar")
        .append_pair("key", key);
    url
}

fn classify_transport_error(e: &reqwest::Error) -> FetchOutcome {
    if e.is_timeout() {
        FetchOutcome::TransientError("request timed out".to_string())
    } else if e.is_connect() {
        FetchOutcome::TransientError("connection failed".to_string())
    } else if e.is_builder() {
        FetchOutcome::FatalError(format!("invalid request: {}", e))
    } else {
        FetchOutcome::TransientError(e.to_string())
    }
}

/// Classifies a 2xx response body
fn classify_payload(id: u64, body: &str, default_cooldown: Duration) -> FetchOutcome {
    let payload: ApiPayload = match serde_json::from_str(body) {
        Ok(payload) => payload,
        Err(e) => return FetchOutcome::FatalError(format!("malformed payload: {}", e)),
    };

    if let Some(error) = payload.error {
        return match error.code {
            5 => FetchOutcome::RateLimited(default_cooldown),
            6 | 7 => FetchOutcome::NotFound,
            8 | 9 | 17 => FetchOutcome::TransientError(format!(
                "API error {}: {}",
                error.code, error.error
            )),
            code => FetchOutcome::FatalError(format!("API error {}: {}", code, error.error)),
        };
    }

    let Some(name) = payload.name else {
        return FetchOutcome::FatalError("malformed payload: missing name".to_string());
    };

    let listings = payload
        .bazaar
        .unwrap_or_default()
        .into_iter()
        .map(|item| Listing {
            item_id: item.id,
            name: item.name,
            category: if item.category.is_empty() {
                "Miscellaneous".to_string()
            } else {
                item.category
            },
            price: item.price,
            quantity: item.quantity,
            market_value: item.market_price,
        })
        .collect();

    FetchOutcome::Success(PlayerRecord {
        player_id: id,
        name,
        listings,
    })
}
