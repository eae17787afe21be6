//! Single-flight and concurrency tests through the HTTP router.
//!
//! Tests verify:
//! - Concurrent misses for one image cause exactly one origin fetch
//! - Different images fill independently
//! - Failures reach every waiter and are retried afterwards

use std::time::Duration;

use axum::http::StatusCode;

use watermark_cache::error::FetchError;

use super::test_utils::{body_bytes, build_app, create_test_jpeg, get, MockOrigin};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_single_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockOrigin::new()
        .with_asset("content/images/2021/hot.jpg", create_test_jpeg(512, 384))
        .with_delay(Duration::from_millis(100));
    let (router, service) = build_app(origin.clone(), dir.path());

    let mut handles = Vec::new();
    for _ in 0..32 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            let response = get(&router, "/content/images/2021/hot.jpg").await;
            (response.status(), body_bytes(response).await)
        }));
    }

    let mut bodies = Vec::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        bodies.push(body);
    }

    assert_eq!(origin.fetch_count("content/images/2021/hot.jpg"), 1);
    assert!(bodies.iter().all(|b| *b == bodies[0]));
    assert_eq!(service.in_flight_count(), 0);

    let response = get(&router, "/content/images/2021/hot.jpg").await;
    assert_eq!(response.headers()["x-watermark-cache"], "hit");
    assert_eq!(origin.total_fetches(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_images_fill_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let mut origin = MockOrigin::new().with_delay(Duration::from_millis(50));
    for i in 0..8 {
        origin = origin.with_asset(&format!("content/images/{}.jpg", i), create_test_jpeg(64, 64));
    }
    let (router, _) = build_app(origin.clone(), dir.path());

    let mut handles = Vec::new();
    for i in 0..8 {
        for _ in 0..3 {
            let router = router.clone();
            handles.push(tokio::spawn(async move {
                get(&router, &format!("/content/images/{}.jpg", i)).await.status()
            }));
        }
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    for i in 0..8 {
        assert_eq!(origin.fetch_count(&format!("content/images/{}.jpg", i)), 1);
        assert!(dir.path().join(format!("content/images/{}.jpg", i)).is_file());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_shared_then_retried() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockOrigin::new().with_delay(Duration::from_millis(80));
    origin.set(
        "content/images/flaky.jpg",
        Err(FetchError::Transport("timeout".to_string())),
    );
    let (router, service) = build_app(origin.clone(), dir.path());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            get(&router, "/content/images/flaky.jpg").await.status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::INTERNAL_SERVER_ERROR);
    }
    assert_eq!(origin.fetch_count("content/images/flaky.jpg"), 1);
    assert_eq!(service.in_flight_count(), 0);

    // Origin recovers; the failure was not remembered
    origin.set("content/images/flaky.jpg", Ok(create_test_jpeg(64, 64).into()));
    let response = get(&router, "/content/images/flaky.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(origin.fetch_count("content/images/flaky.jpg"), 2);
}
