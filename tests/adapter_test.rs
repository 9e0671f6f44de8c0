//! Adapter responses, fallback shapes and the write command fan-out

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{config_paths, FailingController, FlagPeer, RecordingController};
use framectl::control::{
    AdapterResponse, ControllerConfig, ControllerRegistry, ControllerState,
    FrameHandlerAdapter, FrameHandlerController, SharedPeer,
};
use serde_json::{json, Value};

fn adapter(name: &str) -> FrameHandlerAdapter {
    let config = ControllerConfig::builder()
        .name(name)
        .poll_interval_ms(5)
        .build()
        .unwrap();
    FrameHandlerAdapter::from_config(&config, &ControllerRegistry::default()).unwrap()
}

async fn settle(adapter: &FrameHandlerAdapter) -> ControllerState {
    tokio::time::timeout(Duration::from_secs(5), adapter.controller().wait_settled())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_module_read_falls_back_to_controller() {
    let mut adapter = adapter("fp1");
    let peer = Arc::new(FlagPeer::new(RecordingController::new("od_fps")));
    let workers = Arc::new(RecordingController::new("workers"));
    adapter.connect(peer.clone(), workers).unwrap();

    let response = adapter.get("/module", false).await;
    assert_eq!(response, AdapterResponse::ok(json!({"module": "fp1"})));
    assert_eq!(peer.inner.get_calls(), vec!["/module".to_string()]);

    adapter.cleanup().await;
}

#[tokio::test]
async fn test_peer_read_wins_when_available() {
    let mut adapter = adapter("fp1");
    let peer = Arc::new(FlagPeer::new(
        RecordingController::new("od_fps").with_read("status", json!({"status": {"state": 1}})),
    ));
    adapter
        .connect(peer.clone(), Arc::new(RecordingController::new("workers")))
        .unwrap();

    let response = adapter.get("status", false).await;
    assert_eq!(response.body, json!({"status": {"state": 1}}));
    assert_eq!(response.status, 200);

    adapter.cleanup().await;
}

#[tokio::test]
async fn test_get_failure_reports_only_last_error() {
    let mut adapter = adapter("fp1");
    let peer = Arc::new(FlagPeer::new(RecordingController::new("od_fps")));
    adapter
        .connect(peer, Arc::new(RecordingController::new("workers")))
        .unwrap();

    let response = adapter.get("nothing/here", false).await;
    assert_eq!(response.status, 400);
    assert_eq!(
        response.body,
        json!({"response": "fp1 GET error: Invalid path: nothing/here"})
    );

    adapter.cleanup().await;
}

#[tokio::test]
async fn test_put_total_failure_is_generic() {
    let mut adapter = adapter("fp1");
    let peer = Arc::new(FlagPeer::new(RecordingController::new("od_fps").rejecting("module")));
    adapter
        .connect(peer, Arc::new(RecordingController::new("workers")))
        .unwrap();

    let response = adapter.put("module", json!("renamed")).await;
    assert_eq!(response.status, 400);
    assert_eq!(response.body, json!({"error": "PUT method not implemented by fp1"}));

    let text = response.body.to_string();
    assert!(!text.contains("refused"));
    assert!(!text.contains("read-only"));

    adapter.cleanup().await;
}

#[tokio::test]
async fn test_put_falls_back_to_controller() {
    let mut adapter = adapter("fp1");
    let peer = Arc::new(FlagPeer::new(RecordingController::new("od_fps").rejecting("x")));
    adapter
        .connect(peer, Arc::new(RecordingController::new("workers")))
        .unwrap();

    let response = adapter.put("x", json!(7)).await;
    assert_eq!(response, AdapterResponse::empty());
    assert_eq!(adapter.get("x", false).await.body, json!({"x": 7}));

    adapter.cleanup().await;
}

#[tokio::test]
async fn test_local_settings_bypass_peer() {
    let mut adapter = adapter("fp1");
    let peer = Arc::new(FlagPeer::new(RecordingController::new("od_fps")));
    adapter
        .connect(peer.clone(), Arc::new(RecordingController::new("workers")))
        .unwrap();

    let response = adapter.put("config/hdf/file/name", json!("scan")).await;
    assert!(response.is_success());

    let response = adapter.get("config/hdf/file/name", false).await;
    assert_eq!(response.body, json!({"name": "scan"}));

    let response = adapter.put("config/hdf/frames", json!("many")).await;
    assert_eq!(response.status, 400);

    assert!(peer.inner.get_calls().is_empty());
    assert!(peer.inner.put_calls().is_empty());

    adapter.cleanup().await;
}

#[tokio::test]
async fn test_initialize_finds_peer_by_name() {
    let mut adapter = adapter("fp1");
    let peer = Arc::new(FlagPeer::new(RecordingController::new("od_fps").with_count(2)).ready());

    let mut adapters: HashMap<String, SharedPeer> = HashMap::new();
    adapters.insert("od_fps".to_string(), peer.clone());
    adapter.initialize(&adapters).unwrap();

    assert!(adapter.is_connected());
    assert_eq!(settle(&adapter).await, ControllerState::RankAssigned);
    assert_eq!(peer.inner.put_paths(), config_paths(2));
    assert_eq!(adapter.status()["state"], json!("rank_assigned"));

    adapter.cleanup().await;
}

#[tokio::test]
async fn test_write_command_fans_out_to_ranks() {
    let dir = tempfile::tempdir().unwrap();
    let dir_path = dir.path().to_str().unwrap().to_string();

    let mut adapter = adapter("fp1");
    let peer = Arc::new(FlagPeer::new(RecordingController::new("od_fps").with_count(2)).ready());
    let workers = Arc::new(RecordingController::new("workers"));
    adapter.connect(peer.clone(), workers.clone()).unwrap();
    settle(&adapter).await;

    adapter.put("config/hdf/file/path", json!(dir_path)).await;
    adapter.put("config/hdf/file/name", json!("scan")).await;
    adapter.put("config/hdf/frames", json!(100)).await;

    let response = adapter.put("config/hdf/write", json!("true")).await;
    assert_eq!(response, AdapterResponse::ok(json!({"process_count": 2})));

    let puts: Vec<(String, Value)> = workers.put_calls().into_iter().skip(2).collect();
    assert_eq!(
        puts,
        vec![
            ("0/config".to_string(), json!({"hdf": {"process": {"number": 2, "rank": 0}}})),
            ("1/config".to_string(), json!({"hdf": {"process": {"number": 2, "rank": 1}}})),
            ("0/config".to_string(), json!({"hdf": {"frames": 100}})),
            (
                "0/config".to_string(),
                json!({"hdf": {"file": {"path": dir_path, "name": "scan_r0.h5"}}})
            ),
            ("1/config".to_string(), json!({"hdf": {"frames": 100}})),
            (
                "1/config".to_string(),
                json!({"hdf": {"file": {"path": dir_path, "name": "scan_r1.h5"}}})
            ),
            ("0/config".to_string(), json!({"hdf": {"write": true}})),
            ("1/config".to_string(), json!({"hdf": {"write": true}})),
        ]
    );

    adapter.cleanup().await;
}

#[tokio::test]
async fn test_write_command_rejects_missing_directory() {
    let mut adapter = adapter("fp1");
    let peer = Arc::new(FlagPeer::new(RecordingController::new("od_fps").with_count(2)).ready());
    let workers = Arc::new(RecordingController::new("workers"));
    adapter.connect(peer, workers.clone()).unwrap();
    settle(&adapter).await;

    adapter.put("config/hdf/file/path", json!("/no/such/dir")).await;
    adapter.put("config/hdf/file/name", json!("scan")).await;

    let before = workers.put_calls().len();
    let response = adapter.put("config/hdf/write", json!(true)).await;
    assert_eq!(response.status, 503);
    assert!(response.body["error"].as_str().unwrap().contains("/no/such/dir"));
    assert_eq!(workers.put_calls().len(), before);

    adapter.cleanup().await;
}

#[tokio::test]
async fn test_write_false_stops_every_rank() {
    let mut adapter = adapter("fp1");
    let peer = Arc::new(FlagPeer::new(RecordingController::new("od_fps").with_count(3)).ready());
    let workers = Arc::new(RecordingController::new("workers"));
    adapter.connect(peer, workers.clone()).unwrap();
    settle(&adapter).await;

    let before = workers.put_calls().len();
    let response = adapter.put("config/hdf/write", json!("0")).await;
    assert_eq!(response.body, json!({"process_count": 3}));

    let stops: Vec<(String, Value)> = workers.put_calls().into_iter().skip(before).collect();
    assert_eq!(stops.len(), 3);
    assert!(stops.iter().all(|(_, v)| v == &json!({"hdf": {"write": false}})));

    adapter.cleanup().await;
}

#[tokio::test]
async fn test_write_command_surfaces_worker_failure() {
    let dir = tempfile::tempdir().unwrap();

    let controller = Arc::new(FrameHandlerController::new("fp1"));
    let mut adapter = FrameHandlerAdapter::new("fp1", controller);
    let peer: SharedPeer = Arc::new(FlagPeer::new(RecordingController::new("od_fps").with_count(1)));
    let workers = Arc::new(FailingController::unavailable("workers"));
    adapter.connect(peer, workers).unwrap();

    adapter
        .put("config/hdf/file/path", json!(dir.path().to_str().unwrap()))
        .await;
    adapter.put("config/hdf/file/name", json!("scan")).await;

    let response = adapter.put("config/hdf/write", json!(true)).await;
    assert_eq!(response.status, 503);
    assert!(response.body["error"].as_str().unwrap().contains("workers is down"));

    adapter.cleanup().await;
}
