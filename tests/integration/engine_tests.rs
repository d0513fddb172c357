use crate::{api_config, crawl_config, player_body};
use bazaar_crawler::storage::{ProgressStore, SqliteStore};
use bazaar_crawler::{
    CrawlEngine, CrawlPosition, EngineDeps, EngineSettings, EngineState, OperatorApi,
    RateLimitedClient,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_api() -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(player_body("Three")))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/user/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(player_body("Five")))
        .mount(&mock_server)
        .await;

    // Every other ID answers 404
    mock_server
}

fn build_engine(server: &MockServer, db_path: &Path, start: u64, end: u64) -> Arc<CrawlEngine> {
    let store = Arc::new(SqliteStore::new(db_path).unwrap());
    let client = Arc::new(RateLimitedClient::new(&api_config(&server.uri())).unwrap());
    let settings = EngineSettings {
        defaults: crawl_config(start, end),
        ..EngineSettings::default()
    };
    Arc::new(CrawlEngine::new(EngineDeps::with_store(client, store), settings))
}

async fn wait_for_pass(engine: &CrawlEngine) {
    for _ in 0..250 {
        if engine.counters().passes_completed > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("pass did not complete; status {:?}", engine.status());
}

fn requested_ids(requests: &[wiremock::Request]) -> Vec<u64> {
    let mut ids: Vec<u64> = requests
        .iter()
        .filter_map(|r| r.url.path().rsplit('/').next()?.parse().ok())
        .collect();
    ids.sort_unstable();
    ids
}

#[tokio::test]
async fn test_full_pass_stores_players() {
    let server = mock_api().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bazaar.db");

    let engine = build_engine(&server, &db_path, 1, 6);
    engine.init().await.unwrap();
    assert_eq!(engine.state(), EngineState::Running);

    wait_for_pass(&engine).await;
    engine.shutdown().await;

    let store = SqliteStore::new(&db_path).unwrap();
    assert_eq!(store.count_players().unwrap(), 2);
    assert_eq!(store.count_listings().unwrap(), 2);

    let three = store.get_player(3).unwrap().unwrap();
    assert_eq!(three.name, "Three");
    assert_eq!(three.listings[0].quantity, 3);

    let passes = store.recent_passes(10).unwrap();
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].ids_scanned, 6);
    assert_eq!(passes[0].records_found, 2);

    let (_, position) = store.load().unwrap().unwrap();
    assert_eq!(position.current_id, 1);
    assert!(position.last_completed_run.is_some());
    assert!(position.next_scheduled_run.is_some());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requested_ids(&requests), vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_restart_resumes_from_persisted_position() {
    let server = mock_api().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bazaar.db");

    {
        let store = SqliteStore::new(&db_path).unwrap();
        store
            .save(&crawl_config(1, 6), &CrawlPosition::new(4))
            .unwrap();
    }

    let engine = build_engine(&server, &db_path, 1, 6);
    engine.init().await.unwrap();
    wait_for_pass(&engine).await;
    engine.shutdown().await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requested_ids(&requests), vec![4, 5, 6]);

    let store = SqliteStore::new(&db_path).unwrap();
    assert!(store.get_player(3).unwrap().is_none());
    assert!(store.get_player(5).unwrap().is_some());
}

#[tokio::test]
async fn test_completed_pass_survives_restart() {
    let server = mock_api().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bazaar.db");

    let engine = build_engine(&server, &db_path, 1, 6);
    engine.init().await.unwrap();
    wait_for_pass(&engine).await;
    engine.shutdown().await;
    drop(engine);

    // The next pass is an hour away, so a restarted engine just waits
    let engine = build_engine(&server, &db_path, 1, 6);
    engine.init().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = engine.status();
    assert_eq!(status.state, EngineState::Running);
    assert_eq!(status.percent_complete, 100.0);
    assert!(status.next_scheduled_run.is_some());
    assert_eq!(server.received_requests().await.unwrap().len(), 6);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_operator_api_drives_engine() {
    let server = mock_api().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bazaar.db");

    let mut defaults = crawl_config(1, 6);
    defaults.enabled = false;
    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let client = Arc::new(RateLimitedClient::new(&api_config(&server.uri())).unwrap());
    let engine = Arc::new(CrawlEngine::new(
        EngineDeps::with_store(client, store),
        EngineSettings {
            defaults,
            ..EngineSettings::default()
        },
    ));
    engine.init().await.unwrap();
    let api = OperatorApi::new(engine.clone());

    assert_eq!(api.status().status.state, EngineState::Idle);

    let err = api
        .configure_json(r#"{"id_range": {"start": 50, "end": 10}}"#)
        .await
        .unwrap_err();
    assert_eq!(serde_json::to_value(&err).unwrap()["kind"], "validation");

    api.configure_json(r#"{"id_range": {"start": 3, "end": 5}}"#)
        .await
        .unwrap();
    api.start().await.unwrap();
    wait_for_pass(&engine).await;

    let detailed = serde_json::to_value(api.detailed_status()).unwrap();
    assert_eq!(detailed["config"]["id_range"]["start"], 3);
    assert_eq!(detailed["derived_stats"]["succeeded"], 2);
    assert_eq!(detailed["derived_stats"]["not_found"], 1);
    assert_eq!(detailed["status"]["percent_complete"], 100.0);

    let ack = api.pause().await.unwrap();
    assert_eq!(ack.state, EngineState::Paused);
    assert_eq!(requested_ids(&server.received_requests().await.unwrap()), vec![3, 4, 5]);
}
