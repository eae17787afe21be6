//! Test utilities for integration tests.
//!
//! Provides a counting mock origin, image fixtures and router helpers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use tower::ServiceExt;

use watermark_cache::error::FetchError;
use watermark_cache::origin::OriginSource;
use watermark_cache::path::AssetLocator;
use watermark_cache::{
    create_router, OverlayAsset, RouterConfig, ServiceSettings, WatermarkService,
};

// =============================================================================
// Mock Origin
// =============================================================================

/// An in-memory origin keyed by relative path, counting every fetch.
///
/// Missing keys answer `NotFound`. Keys can also be set to fail with an
/// arbitrary error.
#[derive(Clone)]
pub struct MockOrigin {
    assets: Arc<Mutex<HashMap<String, Result<Bytes, FetchError>>>>,
    fetches: Arc<Mutex<HashMap<String, usize>>>,
    total: Arc<AtomicUsize>,
    delay: Duration,
}

impl MockOrigin {
    pub fn new() -> Self {
        Self {
            assets: Arc::new(Mutex::new(HashMap::new())),
            fetches: Arc::new(Mutex::new(HashMap::new())),
            total: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// Register an asset under its relative path (`content/images/...`).
    pub fn with_asset(self, path: &str, data: Vec<u8>) -> Self {
        self.set(path, Ok(Bytes::from(data)));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set(&self, path: &str, result: Result<Bytes, FetchError>) {
        self.assets.lock().unwrap().insert(path.to_string(), result);
    }

    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetches.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginSource for MockOrigin {
    async fn fetch(&self, locator: &AssetLocator) -> Result<Bytes, FetchError> {
        let key = locator.relative_path().to_string();
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.fetches.lock().unwrap().entry(key.clone()).or_insert(0) += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = self.assets.lock().unwrap().get(&key).cloned();
        result.unwrap_or(Err(FetchError::NotFound(key)))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

// =============================================================================
// Image Fixtures
// =============================================================================

/// A gradient JPEG of the given size.
pub fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 64])
    });
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 90)
        .encode_image(&img)
        .unwrap();
    buf
}

/// A half-transparent PNG of the given size.
pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([30, 60, 90, 128]));
    let mut buf = Vec::new();
    img.write_with_encoder(PngEncoder::new(&mut buf)).unwrap();
    buf
}

/// A white, mostly opaque overlay.
pub fn create_overlay() -> OverlayAsset {
    OverlayAsset::from_bytes(&create_test_png_overlay()).unwrap()
}

fn create_test_png_overlay() -> Vec<u8> {
    let img = RgbaImage::from_pixel(100, 40, Rgba([255, 255, 255, 220]));
    let mut buf = Vec::new();
    img.write_with_encoder(PngEncoder::new(&mut buf)).unwrap();
    buf
}

pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[..2] == [0xFF, 0xD8] && data[data.len() - 2..] == [0xFF, 0xD9]
}

pub fn is_valid_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}

// =============================================================================
// Router Helpers
// =============================================================================

/// Build a service and router over a mock origin with default settings.
pub fn build_app(
    origin: MockOrigin,
    cache_root: &Path,
) -> (Router, Arc<WatermarkService<MockOrigin>>) {
    build_app_with(origin, ServiceSettings::new(cache_root))
}

pub fn build_app_with(
    origin: MockOrigin,
    settings: ServiceSettings,
) -> (Router, Arc<WatermarkService<MockOrigin>>) {
    let service = Arc::new(WatermarkService::new(origin, create_overlay(), settings));
    let router = create_router(
        Arc::clone(&service),
        RouterConfig::new().with_cache_max_age(600).with_tracing(false),
    );
    (router, service)
}

pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    send(router, "GET", uri).await
}

pub async fn send(router: &Router, method: &str, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
