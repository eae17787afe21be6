//! Watermarking pipeline.
//!
//! ```text
//! request path ──► PathResolver ──► CacheStore ── hit ──► bytes
//!                                       │
//!                                      miss
//!                                       │
//!                                       ▼
//!                  single-flight ──► OriginFetcher ──► Compositor ──► CacheStore
//! ```
//!
//! - [`Compositor`] resizes the overlay relative to the source, blends it in
//!   and re-encodes the result
//! - [`CacheStore`] persists artifacts write-once with atomic renames
//! - [`WatermarkService`] ties the pieces together and collapses concurrent
//!   misses for the same asset into one fill

mod compositor;
mod service;
mod store;

pub use compositor::{
    artifact_content_type, overlay_dimensions, Anchor, BlendMode, Compositor, OutputEncoding, OverlayAsset,
    WatermarkPolicy, DEFAULT_JPEG_QUALITY, DEFAULT_MARGIN_PERCENT, DEFAULT_OPACITY,
    DEFAULT_OVERLAY_FRACTION, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use service::{ServiceSettings, WatermarkResponse, WatermarkService};
pub use store::CacheStore;
