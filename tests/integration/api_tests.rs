//! API integration tests for watermarked image retrieval and error handling.
//!
//! Tests verify:
//! - Miss then hit for JPEG and PNG sources
//! - Response headers
//! - Rejections with no cache side effects
//! - Origin failures and their status codes

use axum::http::{header, StatusCode};

use watermark_cache::error::FetchError;
use watermark_cache::{OutputEncoding, ServiceSettings, WatermarkPolicy};

use super::test_utils::{
    body_bytes, body_json, build_app, build_app_with, create_test_jpeg, create_test_png, get,
    is_valid_jpeg, is_valid_png, send, MockOrigin,
};

// =============================================================================
// Retrieval
// =============================================================================

#[tokio::test]
async fn test_jpeg_miss_then_hit() {
    let dir = tempfile::tempdir().unwrap();
    let origin =
        MockOrigin::new().with_asset("content/images/2021/11/foo.jpg", create_test_jpeg(400, 300));
    let (router, service) = build_app(origin.clone(), dir.path());

    let response = get(&router, "/content/images/2021/11/foo.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=600");
    assert_eq!(response.headers()["x-watermark-cache"], "miss");
    let first = body_bytes(response).await;
    assert!(is_valid_jpeg(&first));

    // Persisted under the same relative path
    let cached = dir.path().join("content/images/2021/11/foo.jpg");
    assert_eq!(std::fs::read(&cached).unwrap(), first.to_vec());

    let response = get(&router, "/content/images/2021/11/foo.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-watermark-cache"], "hit");
    assert_eq!(body_bytes(response).await, first);

    assert_eq!(origin.fetch_count("content/images/2021/11/foo.jpg"), 1);
    assert_eq!(service.in_flight_count(), 0);
}

#[tokio::test]
async fn test_output_dimensions_match_source() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockOrigin::new().with_asset("content/images/wide.jpeg", create_test_jpeg(640, 120));
    let (router, _) = build_app(origin, dir.path());

    let body = body_bytes(get(&router, "/content/images/wide.jpeg").await).await;
    let decoded = image::load_from_memory(&body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (640, 120));
}

#[tokio::test]
async fn test_uppercase_extension_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockOrigin::new().with_asset("content/images/Photo.JPG", create_test_jpeg(64, 64));
    let (router, _) = build_app(origin, dir.path());

    let response = get(&router, "/content/images/Photo.JPG").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(dir.path().join("content/images/Photo.JPG").is_file());
}

#[tokio::test]
async fn test_png_reencoded_as_jpeg_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockOrigin::new().with_asset("content/images/logo.png", create_test_png(120, 80));
    let (router, _) = build_app(origin, dir.path());

    let response = get(&router, "/content/images/logo.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert!(is_valid_jpeg(&body_bytes(response).await));
}

#[tokio::test]
async fn test_png_preserved_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockOrigin::new().with_asset("content/images/logo.png", create_test_png(120, 80));
    let policy = WatermarkPolicy {
        encoding: OutputEncoding::Preserve,
        ..WatermarkPolicy::default()
    };
    let (router, _) = build_app_with(origin, ServiceSettings::new(dir.path()).with_policy(policy));

    for expected_cache in ["miss", "hit"] {
        let response = get(&router, "/content/images/logo.png").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(response.headers()["x-watermark-cache"], expected_cache);
        assert!(is_valid_png(&body_bytes(response).await));
    }
}

#[tokio::test]
async fn test_head_returns_headers_only() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockOrigin::new().with_asset("content/images/a.jpg", create_test_jpeg(64, 64));
    let (router, _) = build_app(origin, dir.path());

    let response = send(&router, "HEAD", "/content/images/a.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert!(body_bytes(response).await.is_empty());

    // The fill still happened
    assert!(dir.path().join("content/images/a.jpg").is_file());
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn test_rejections_have_no_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockOrigin::new();
    let (router, _) = build_app(origin.clone(), dir.path());

    let cases = [
        ("/content/images/..%2F..%2Fetc%2Fpasswd.jpg", StatusCode::BAD_REQUEST, "invalid_request"),
        ("/content/images/%2e%2e/secret.jpg", StatusCode::BAD_REQUEST, "invalid_request"),
        ("/content/images/a%20b.jpg", StatusCode::BAD_REQUEST, "invalid_request"),
        ("/content/images//a.jpg", StatusCode::BAD_REQUEST, "invalid_request"),
        ("/content/images/a.gif", StatusCode::BAD_REQUEST, "unsupported_type"),
        ("/content/images/README", StatusCode::BAD_REQUEST, "unsupported_type"),
        ("/content/other/a.jpg", StatusCode::NOT_FOUND, "not_found"),
        ("/favicon.ico", StatusCode::NOT_FOUND, "not_found"),
    ];

    for (uri, status, error_type) in cases {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), status, "{}", uri);
        let json = body_json(response).await;
        assert_eq!(json["error"], error_type, "{}", uri);
    }

    assert_eq!(origin.total_fetches(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_query_string_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockOrigin::new().with_asset("content/images/a.jpg", create_test_jpeg(32, 32));
    let (router, _) = build_app(origin.clone(), dir.path());

    assert_eq!(get(&router, "/content/images/a.jpg?v=1").await.status(), StatusCode::OK);
    assert_eq!(get(&router, "/content/images/a.jpg?v=2").await.status(), StatusCode::OK);
    assert_eq!(origin.fetch_count("content/images/a.jpg"), 1);
}

#[tokio::test]
async fn test_other_methods_not_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockOrigin::new().with_asset("content/images/a.jpg", create_test_jpeg(32, 32));
    let (router, _) = build_app(origin.clone(), dir.path());

    for method in ["POST", "PUT", "DELETE"] {
        let response = send(&router, method, "/content/images/a.jpg").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, HEAD");
    }
    assert_eq!(origin.total_fetches(), 0);
}

// =============================================================================
// Origin Failures
// =============================================================================

#[tokio::test]
async fn test_origin_not_found_is_404_and_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockOrigin::new();
    let (router, _) = build_app(origin.clone(), dir.path());

    let response = get(&router, "/content/images/missing.jpg").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!dir.path().join("content/images/missing.jpg").exists());

    // Appears at the origin later; the next request picks it up
    origin.set(
        "content/images/missing.jpg",
        Ok(create_test_jpeg(32, 32).into()),
    );
    let response = get(&router, "/content/images/missing.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(origin.fetch_count("content/images/missing.jpg"), 2);
}

#[tokio::test]
async fn test_transport_error_is_generic_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockOrigin::new();
    origin.set(
        "content/images/a.jpg",
        Err(FetchError::Transport("connection refused to 10.0.0.7".to_string())),
    );
    let (router, _) = build_app(origin, dir.path());

    let response = get(&router, "/content/images/a.jpg").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Server Error");
    assert!(!json.to_string().contains("10.0.0.7"));
    assert!(!dir.path().join("content/images/a.jpg").exists());
}

#[tokio::test]
async fn test_non_image_body_is_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let origin =
        MockOrigin::new().with_asset("content/images/a.jpg", b"<html>oops</html>".to_vec());
    let (router, _) = build_app(origin, dir.path());

    let response = get(&router, "/content/images/a.jpg").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!dir.path().join("content/images/a.jpg").exists());
}

#[tokio::test]
async fn test_oversized_source_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockOrigin::new().with_asset("content/images/big.jpg", create_test_jpeg(300, 20));
    let settings = ServiceSettings::new(dir.path()).with_max_source_dimensions(Some((256, 256)));
    let (router, _) = build_app_with(origin, settings);

    let response = get(&router, "/content/images/big.jpg").await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["error"], "too_large");
    assert!(!dir.path().join("content/images/big.jpg").exists());
}

// =============================================================================
// Service Endpoints
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = build_app(MockOrigin::new(), dir.path());

    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_index_banner() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = build_app(MockOrigin::new(), dir.path());

    let response = get(&router, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, "Wanderstories Image Watermarker");
}
