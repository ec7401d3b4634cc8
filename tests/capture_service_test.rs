//! Capture service against an in-memory multiplexer

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakeMux;
use pane_watch::config::RuntimeConfig;
use pane_watch::{CaptureService, MuxError};

fn service(mux: Arc<FakeMux>) -> CaptureService {
    CaptureService::new(mux, &RuntimeConfig::default())
}

#[tokio::test]
async fn test_concurrent_callers_share_one_batch() {
    let mux = Arc::new(FakeMux::new().with_delay(Duration::from_millis(30)));
    for name in ["cam-a", "cam-b", "cam-c"] {
        mux.set_screen(name, &format!("{} screen", name));
    }
    let service = service(mux.clone());
    for name in ["cam-a", "cam-b", "cam-c"] {
        service.registry().touch(name);
    }

    let (a, b, c) = tokio::join!(
        service.capture_one("cam-a"),
        service.capture_one("cam-b"),
        service.capture_one("cam-c"),
    );

    assert_eq!(a.unwrap(), "cam-a screen");
    assert_eq!(b.unwrap(), "cam-b screen");
    assert_eq!(c.unwrap(), "cam-c screen");
    assert_eq!(mux.batches(), 1);
    assert_eq!(mux.singles(), 0);
}

#[tokio::test]
async fn test_lone_session_is_captured_directly() {
    let mux = Arc::new(FakeMux::new());
    mux.set_screen("cam-a", "hello");
    let service = service(mux.clone());

    assert_eq!(service.capture_one("cam-a").await.unwrap(), "hello");
    assert_eq!(mux.batches(), 0);
    assert_eq!(mux.singles(), 1);

    // fresh cache entry: no second invocation
    assert_eq!(service.capture_one("cam-a").await.unwrap(), "hello");
    assert_eq!(mux.singles(), 1);
}

#[tokio::test]
async fn test_missing_session_is_forgotten() {
    let mux = Arc::new(FakeMux::new());
    let service = service(mux.clone());

    let err = service.capture_one("cam-gone").await.unwrap_err();
    assert!(matches!(err, MuxError::NotFound { .. }));
    assert!(service.registry().is_empty());
    assert!(service.cache().get("cam-gone").is_none());
}

#[tokio::test]
async fn test_failed_batch_falls_back_to_direct_capture() {
    let mux = Arc::new(FakeMux::new().with_failing_batch());
    mux.set_screen("cam-a", "a");
    mux.set_screen("cam-b", "b");
    let service = service(mux.clone());
    service.registry().touch("cam-b");

    assert_eq!(service.capture_one("cam-a").await.unwrap(), "a");
    assert_eq!(mux.batches(), 1);
    assert_eq!(mux.singles(), 1);
}

#[tokio::test]
async fn test_batch_result_missing_inactive_peer_still_serves_caller() {
    let mux = Arc::new(FakeMux::new());
    mux.set_screen("cam-a", "a");
    let service = service(mux.clone());
    service.registry().touch("cam-b");

    // cam-b is active but has no screen: the batch answers only cam-a
    assert_eq!(service.capture_one("cam-a").await.unwrap(), "a");
    assert_eq!(mux.batches(), 1);
    assert_eq!(mux.singles(), 0);
}
