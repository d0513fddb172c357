//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the player API and tempfile-backed SQLite
//! databases to exercise the client, storage and engine together.

mod client_tests;
mod engine_tests;

use bazaar_crawler::config::{ApiConfig, CrawlConfig, IdRange};
use serde_json::json;

/// API settings pointing at a mock server, with a generous quota
pub fn api_config(base_url: &str) -> ApiConfig {
    ApiConfig {
        key: "testkey".to_string(),
        base_url: base_url.to_string(),
        max_calls: 100,
        window_seconds: 60,
        request_timeout_ms: 2000,
        max_acquire_wait_ms: 1000,
        rate_limit_cooldown_seconds: 1,
    }
}

/// Fast crawl parameters over `[start, end]`
pub fn crawl_config(start: u64, end: u64) -> CrawlConfig {
    CrawlConfig {
        enabled: true,
        interval_minutes: 60,
        id_range: IdRange::new(start, end),
        request_delay_ms: 0,
        batch_size: 2,
        max_concurrent_requests: 2,
    }
}

/// A player with one bazaar listing, as the API returns it
pub fn player_body(name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "bazaar": [
            {
                "ID": 206,
                "UID": 9001,
                "name": "Xanax",
                "type": "Drug",
                "quantity": 3,
                "price": 830000,
                "market_price": 815000
            }
        ]
    })
}
