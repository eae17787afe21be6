//! HTTP request handlers for the watermark cache.
//!
//! # Endpoints
//!
//! - `GET /` - Plain-text service banner
//! - `GET /health` - Health check endpoint
//! - `GET /{content_prefix}/...` - Serve a watermarked image (router fallback)

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use http::{header, HeaderValue, Method, StatusCode, Uri};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{FetchError, ResolveError, WatermarkError};
use crate::origin::OriginSource;
use crate::watermark::WatermarkService;

/// Default Cache-Control max-age in seconds (one day).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 86_400;

/// Response header reporting whether the artifact was already cached.
pub const CACHE_STATUS_HEADER: &str = "x-watermark-cache";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state, passed to handlers via Axum's State extractor.
pub struct AppState<S: OriginSource> {
    pub service: Arc<WatermarkService<S>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,
}

impl<S: OriginSource> AppState<S> {
    pub fn new(service: WatermarkService<S>) -> Self {
        Self::with_cache_max_age(Arc::new(service), DEFAULT_CACHE_MAX_AGE)
    }

    pub fn with_cache_max_age(service: Arc<WatermarkService<S>>, cache_max_age: u32) -> Self {
        Self {
            service,
            cache_max_age,
        }
    }
}

impl<S: OriginSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Generic body message for every 5xx response.
const SERVER_ERROR_MESSAGE: &str = "Server Error";

/// Status code and error identifier for a service error.
pub fn error_status(err: &WatermarkError) -> (StatusCode, &'static str) {
    match err {
        WatermarkError::Rejected(ResolveError::NotFound { .. }) => {
            (StatusCode::NOT_FOUND, "not_found")
        }
        WatermarkError::Rejected(ResolveError::InvalidRequest { .. }) => {
            (StatusCode::BAD_REQUEST, "invalid_request")
        }
        WatermarkError::Rejected(ResolveError::UnsupportedType { .. }) => {
            (StatusCode::BAD_REQUEST, "unsupported_type")
        }
        WatermarkError::Fetch(FetchError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
        WatermarkError::Fetch(FetchError::TooLarge { .. })
        | WatermarkError::Fetch(FetchError::BodyTooLarge { .. }) => {
            (StatusCode::PAYLOAD_TOO_LARGE, "too_large")
        }
        WatermarkError::Fetch(FetchError::Transport(_))
        | WatermarkError::Transform(_)
        | WatermarkError::Persist(_)
        | WatermarkError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
    }
}

/// Convert WatermarkError to HTTP response.
///
/// 4xx errors are logged at DEBUG (404) or WARN, 5xx at ERROR. Server errors
/// never expose their detail to the client.
impl IntoResponse for WatermarkError {
    fn into_response(self) -> Response {
        let (status, error_type) = error_status(&self);
        let detail = self.to_string();

        let message = if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                detail
            );
            SERVER_ERROR_MESSAGE.to_string()
        } else {
            if status == StatusCode::NOT_FOUND {
                debug!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Resource not found: {}",
                    detail
                );
            } else {
                warn!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Client error: {}",
                    detail
                );
            }
            detail
        };

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Serve a watermarked image for any path not matched by another route.
///
/// # Response
///
/// - `200 OK`: Watermarked image
/// - `400 Bad Request`: Malformed path or unsupported extension
/// - `404 Not Found`: Outside the content prefix, or missing at origin
/// - `405 Method Not Allowed`: Anything but GET or HEAD
/// - `413 Payload Too Large`: Source exceeds the dimension or byte limit
/// - `500 Internal Server Error`: Origin, transform or storage failure
///
/// # Headers
///
/// - `Content-Type: image/jpeg` or `image/png`
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Watermark-Cache: hit|miss`
pub async fn asset_handler<S: OriginSource>(
    State(state): State<AppState<S>>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return method_not_allowed();
    }

    let response = match state.service.handle(uri.path()).await {
        Ok(response) => response,
        Err(err) => return err.into_response(),
    };

    let cache_status = if response.cache_hit { "hit" } else { "miss" };
    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(response.data.clone())
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(response.content_type)),
            (header::CONTENT_LENGTH, HeaderValue::from(response.data.len())),
            (header::CACHE_CONTROL, cache_control(state.cache_max_age)),
            (
                header::HeaderName::from_static(CACHE_STATUS_HEADER),
                HeaderValue::from_static(cache_status),
            ),
        ],
        body,
    )
        .into_response()
}

fn cache_control(max_age: u32) -> HeaderValue {
    // Digits and ASCII only, always a valid header value
    HeaderValue::from_str(&format!("public, max-age={}", max_age))
        .unwrap_or_else(|_| HeaderValue::from_static("public"))
}

fn method_not_allowed() -> Response {
    let status = StatusCode::METHOD_NOT_ALLOWED;
    let mut response = (
        status,
        Json(ErrorResponse::with_status(
            "method_not_allowed",
            "Only GET and HEAD are supported",
            status,
        )),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
    response
}

/// Handle health check requests.
///
/// `200 OK` with JSON body `{"status": "healthy", "version": "0.1.0"}`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Plain-text banner served at the root.
pub const INDEX_BANNER: &str = "Wanderstories Image Watermarker";

/// Plain-text banner at the root.
pub async fn index_handler() -> &'static str {
    INDEX_BANNER
}

// =============================================================================
// Tests
// =============================================================================
