//! # Watermark Cache
//!
//! An on-demand image watermarking cache. Images are fetched from an origin
//! the first time they are requested, composited with an overlay, persisted
//! to disk and served from disk forever after.
//!
//! ## Features
//!
//! - **Write-once cache**: Each artifact is produced at most once and written atomically
//! - **Single-flight fills**: Concurrent misses for the same image share one origin fetch
//! - **Strict path validation**: Traversal and unexpected characters are rejected before any I/O
//! - **Configurable compositing**: Overlay size, opacity, blend mode, anchor and output format
//!
//! ## Architecture
//!
//! - [`path`] - Request path validation and cache-path mapping
//! - [`origin`] - Origin retrieval (HTTP) and source size policy
//! - [`watermark`] - Compositing, artifact store and the watermark service
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use watermark_cache::{create_router, HttpOrigin, OverlayAsset, RouterConfig, ServiceSettings, WatermarkService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let origin = HttpOrigin::new("https://example.com", Duration::from_secs(30))?;
//!     let overlay = OverlayAsset::from_bytes(&std::fs::read("logo.png")?)?;
//!     let service = WatermarkService::new(origin, overlay, ServiceSettings::new("/var/cache/wm"));
//!
//!     let router = create_router(Arc::new(service), RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod origin;
pub mod path;
pub mod server;
pub mod watermark;

// Re-export commonly used types
pub use config::{AnchorKind, Config};
pub use error::{FetchError, ResolveError, StoreError, TransformError, WatermarkError};
pub use origin::{HttpOrigin, OriginFetcher, OriginSource, SourceAsset};
pub use path::{AssetLocator, MediaKind, PathResolver};
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
pub use watermark::{
    Anchor, BlendMode, CacheStore, Compositor, OutputEncoding, OverlayAsset, ServiceSettings,
    WatermarkPolicy, WatermarkResponse, WatermarkService,
};
