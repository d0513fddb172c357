use crate::{api_config, player_body};
use bazaar_crawler::client::{FetchOutcome, RateLimitedClient, RecordFetcher};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_fetch_success_parses_listings() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user/42"))
        .and(query_param("selections", "profile,bazaar"))
        .and(query_param("key", "testkey"))
        .respond_with(ResponseTemplate::new(200).set_body_json(player_body("Seller")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RateLimitedClient::new(&api_config(&mock_server.uri())).unwrap();

    match client.fetch(42).await {
        FetchOutcome::Success(record) => {
            assert_eq!(record.player_id, 42);
            assert_eq!(record.name, "Seller");
            assert_eq!(record.listings.len(), 1);
            assert_eq!(record.listings[0].item_id, 206);
            assert_eq!(record.listings[0].category, "Drug");
            assert_eq!(record.listings[0].price, 830000);
        }
        other => panic!("expected success, got {:?}", other),
    }

    let quota = client.quota_snapshot();
    assert_eq!(quota.calls_per_hour, 1);
    assert_eq!(quota.remaining, 99);
    assert!(quota.last_error_time.is_none());
}

#[tokio::test]
async fn test_missing_players_are_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user/6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": 6, "error": "Incorrect ID"}
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/user/7"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = RateLimitedClient::new(&api_config(&mock_server.uri())).unwrap();

    assert_eq!(client.fetch(6).await, FetchOutcome::NotFound);
    assert_eq!(client.fetch(7).await, FetchOutcome::NotFound);
}

#[tokio::test]
async fn test_http_429_backs_off() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&mock_server)
        .await;

    let client = RateLimitedClient::new(&api_config(&mock_server.uri())).unwrap();

    assert_eq!(
        client.fetch(1).await,
        FetchOutcome::RateLimited(Duration::from_secs(7))
    );
    assert!(client.limiter().is_cooling_down());

    let quota = client.quota_snapshot();
    assert!(quota.last_error_time.is_some());
    assert!(!quota.rate_limit_available);
}

#[tokio::test]
async fn test_api_rate_limit_code_uses_default_cooldown() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": 5, "error": "Too many requests"}
        })))
        .mount(&mock_server)
        .await;

    let client = RateLimitedClient::new(&api_config(&mock_server.uri())).unwrap();
    assert_eq!(
        client.fetch(1).await,
        FetchOutcome::RateLimited(Duration::from_secs(1))
    );
}

#[tokio::test]
async fn test_error_classification() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user/1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/user/2"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/user/3"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/user/4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": 2, "error": "Incorrect key"}
        })))
        .mount(&mock_server)
        .await;

    let client = RateLimitedClient::new(&api_config(&mock_server.uri())).unwrap();

    assert!(matches!(client.fetch(1).await, FetchOutcome::TransientError(_)));
    assert!(matches!(client.fetch(2).await, FetchOutcome::FatalError(_)));
    assert!(matches!(client.fetch(3).await, FetchOutcome::FatalError(_)));
    assert!(matches!(client.fetch(4).await, FetchOutcome::FatalError(_)));

    let quota = client.quota_snapshot();
    assert_eq!(quota.calls_per_hour, 4);
    assert!(quota.uptime_percentage < 100.0);
}

#[tokio::test]
async fn test_slow_response_times_out_as_transient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(player_body("Slow"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let mut config = api_config(&mock_server.uri());
    config.request_timeout_ms = 200;
    let client = RateLimitedClient::new(&config).unwrap();

    assert!(matches!(client.fetch(1).await, FetchOutcome::TransientError(_)));
}

#[tokio::test]
async fn test_quota_ceiling_is_never_exceeded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let mut config = api_config(&mock_server.uri());
    config.max_calls = 3;
    config.max_acquire_wait_ms = 0;
    let client = RateLimitedClient::new(&config).unwrap();

    let mut limited = 0;
    for id in 1..=6 {
        if let FetchOutcome::RateLimited(wait) = client.fetch(id).await {
            assert!(wait > Duration::ZERO);
            limited += 1;
        }
    }

    assert_eq!(limited, 3);
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}
