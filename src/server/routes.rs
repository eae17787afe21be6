//! Router configuration for the watermark cache.
//!
//! # Route Structure
//!
//! ```text
//! /                      - Service banner
//! /health                - Health check
//! everything else        - Watermarked asset (fallback, validated by PathResolver)
//! ```
//!
//! Asset paths go through the fallback rather than a wildcard route so that
//! the raw request path, percent-encoding included, reaches the resolver
//! unchanged.
//!
//! # Example
//!
//! ```ignore
//! use watermark_cache::server::{create_router, RouterConfig};
//!
//! let router = create_router(service, RouterConfig::new().with_cache_max_age(3600));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{asset_handler, health_handler, index_handler, AppState, DEFAULT_CACHE_MAX_AGE};
use crate::origin::OriginSource;
use crate::watermark::WatermarkService;

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// One-day max-age, tracing enabled.
    pub fn new() -> Self {
        Self {
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_tracing: true,
        }
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

/// Create the application router.
///
/// The service is shared behind an `Arc`, so callers may keep a handle to it
/// (for example to inspect the in-flight registry in tests).
pub fn create_router<S>(service: Arc<WatermarkService<S>>, config: RouterConfig) -> Router
where
    S: OriginSource + 'static,
{
    let app_state = AppState::with_cache_max_age(service, config.cache_max_age);

    let router = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .fallback(asset_handler::<S>)
        .with_state(app_state);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}
