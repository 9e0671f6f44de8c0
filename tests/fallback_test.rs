//! Fallback routing between a peer and the local controller

mod common;

use std::sync::Arc;

use common::{FailingController, RecordingController};
use framectl::control::{Backend, FallbackRouter, SharedController};
use framectl::ControlError;
use serde_json::json;

#[tokio::test]
async fn test_primary_read_never_consults_secondary() {
    let primary = Arc::new(RecordingController::new("od").with_read("status", json!({"status": "ok"})));
    let secondary = Arc::new(RecordingController::new("fp"));
    let router = FallbackRouter::new(primary.clone(), secondary.clone());

    let routed = router.read("status", false).await.unwrap();
    assert_eq!(routed.value, json!({"status": "ok"}));
    assert_eq!(routed.source, Backend::Primary);
    assert!(secondary.get_calls().is_empty());
}

#[tokio::test]
async fn test_read_falls_back_to_secondary() {
    let primary = Arc::new(FailingController::unavailable("od"));
    let secondary = Arc::new(RecordingController::new("fp").with_read("module", json!({"module": "fp1"})));
    let router = FallbackRouter::new(primary.clone(), secondary.clone());

    let routed = router.read("module", false).await.unwrap();
    assert_eq!(routed.value, json!({"module": "fp1"}));
    assert_eq!(routed.source, Backend::Secondary);
    assert_eq!(primary.call_count(), 1);
}

#[tokio::test]
async fn test_read_total_failure_keeps_both_errors() {
    let primary: SharedController = Arc::new(FailingController::unavailable("od"));
    let secondary: SharedController = Arc::new(RecordingController::new("fp"));
    let router = FallbackRouter::new(primary, secondary);

    let err = router.read("nope", false).await.unwrap_err();
    assert_eq!(err.primary, ControlError::PeerUnavailable("od is down".into()));
    assert_eq!(err.last(), &ControlError::PathNotFound("nope".into()));
}

#[tokio::test]
async fn test_write_succeeds_if_either_backend_accepts() {
    let cases = [
        (true, true, Some(Backend::Primary)),
        (false, true, Some(Backend::Secondary)),
        (true, false, Some(Backend::Primary)),
        (false, false, None),
    ];

    for (primary_ok, secondary_ok, expected) in cases {
        let primary: SharedController = if primary_ok {
            Arc::new(RecordingController::new("od"))
        } else {
            Arc::new(FailingController::unavailable("od"))
        };
        let secondary: SharedController = if secondary_ok {
            Arc::new(RecordingController::new("fp"))
        } else {
            Arc::new(RecordingController::new("fp").rejecting("x"))
        };

        let router = FallbackRouter::new(primary, secondary);
        let result = router.write("x", json!(1)).await;
        assert_eq!(result.ok().map(|r| r.source), expected);
    }
}

#[tokio::test]
async fn test_secondary_write_receives_same_value() {
    let primary = Arc::new(FailingController::unavailable("od"));
    let secondary = Arc::new(RecordingController::new("fp"));
    let router = FallbackRouter::new(primary, secondary.clone());

    router.write("config/frames", json!({"n": 3})).await.unwrap();
    assert_eq!(
        secondary.put_calls(),
        vec![("config/frames".to_string(), json!({"n": 3}))]
    );
}
