//! Contract Test: Shutdown Determinism
//!
//! Constraints verified:
//! - The delivery loop terminates on the shutdown signal and on shutdown()
//! - Every listener is deregistered exactly once, however often shutdown runs
//! - No update is delivered to observers after shutdown began
//!
//! If this test fails, someone has added:
//! - Detached background tasks
//! - A second teardown path
//! - Delivery that ignores the closed flag

mod common;

use common::*;
use huckleberry_core::coordinator::CoordinatorEvent;
use huckleberry_core::model::StreamKind;
use serde_json::json;
use std::time::Duration;
use tokio_test::assert_ok;

#[tokio::test]
async fn shutdown_signal_terminates_loop_and_stops_listeners() {
    let api = MockTrackerApi::with_children(2);
    let vendor = MockTrackerApi::sharing_counters_with(&api);
    let mut running = RunningCoordinator::start(api).await;
    assert_eq!(vendor.register_calls(), 8);

    running
        .wait_for_event(|e| matches!(e, CoordinatorEvent::Started { children_count: 2 }))
        .await;

    let coordinator = running.coordinator.clone();
    assert_ok!(running.stop().await);

    assert!(coordinator.is_shut_down());
    assert_eq!(vendor.stop_calls(), 1);
    assert!(!vendor.has_listener("child_1", StreamKind::Sleep));
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let api = MockTrackerApi::with_children(1);
    let vendor = MockTrackerApi::sharing_counters_with(&api);
    let running = RunningCoordinator::start(api).await;
    let coordinator = running.coordinator.clone();

    coordinator.shutdown().await;
    coordinator.shutdown().await;
    assert_ok!(running.stop().await);
    coordinator.shutdown().await;

    assert_eq!(vendor.stop_calls(), 1);
}

#[tokio::test]
async fn shutdown_wakes_the_loop_without_a_signal() {
    let api = MockTrackerApi::with_children(1);
    let running = RunningCoordinator::start(api).await;
    let coordinator = running.coordinator.clone();

    coordinator.shutdown().await;

    let mut events = running.events;
    let stopped = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if let CoordinatorEvent::Stopped { reason } = event {
                return reason;
            }
        }
        panic!("event channel closed before Stopped");
    })
    .await
    .expect("loop should stop after shutdown()");

    assert_eq!(stopped, "Coordinator shut down");
}

#[tokio::test]
async fn no_delivery_after_shutdown() {
    let api = MockTrackerApi::with_children(1);
    let vendor = MockTrackerApi::sharing_counters_with(&api);
    let mut running = RunningCoordinator::start(api).await;
    running
        .wait_for_event(|e| matches!(e, CoordinatorEvent::FallbackRefreshed { .. }))
        .await;

    vendor.emit("child_1", StreamKind::Sleep, json!({"timer": {"active": false}}));
    running
        .wait_for(|s| {
            s.get("child_1")
                .and_then(|c| c.sleep_status.as_deref())
                .is_some_and(|doc| doc.get("timer").is_some())
        })
        .await;

    // The vendor may still fire a callback it handed out before teardown
    let late = vendor.callback("child_1", StreamKind::Feed).unwrap();
    let coordinator = running.coordinator.clone();
    let mut snapshots = coordinator.subscribe();
    snapshots.borrow_and_update();

    coordinator.shutdown().await;
    late(json!({"timer": {"active": true, "activeSide": "left"}}));
    coordinator.on_stream_update("child_1", StreamKind::Diaper, json!({"prefs": {}}));
    assert_ok!(running.stop().await);

    assert!(!snapshots.has_changed().unwrap_or(false));
    let last = coordinator.snapshot();
    assert!(last.get("child_1").unwrap().feed_status.is_none());
    assert!(last.get("child_1").unwrap().diaper_data.is_none());
}
