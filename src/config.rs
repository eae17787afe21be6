//! Configuration management for the watermark cache.
//!
//! Options come from command-line arguments via clap, fall back to
//! environment variables with the `WATERMARK_` prefix, and otherwise use the
//! defaults below. The core never reads configuration itself; [`Config`] is
//! converted into an explicit [`ServiceSettings`] at startup.
//!
//! # Environment Variables
//!
//! - `WATERMARK_HOST` - Server bind address (default: 0.0.0.0)
//! - `WATERMARK_PORT` - Server port (default: 8080)
//! - `WATERMARK_ORIGIN_URL` - Origin base URL (default: https://wanderstories.space)
//! - `WATERMARK_ORIGIN_TIMEOUT` - Origin request timeout in seconds (default: 30)
//! - `WATERMARK_CONTENT_PREFIX` - Served path prefix (default: /content/images)
//! - `WATERMARK_CACHE_DIR` - Artifact directory (default: cache)
//! - `WATERMARK_OVERLAY` - Overlay image file (default: Wanderstories-logo.png)
//! - `WATERMARK_EXTENSIONS` - Accepted extensions (default: jpg,jpeg,png)
//! - `WATERMARK_OVERLAY_FRACTION` - Overlay width relative to source (default: 0.2)
//! - `WATERMARK_OPACITY` - Overlay opacity (default: 0.2)
//! - `WATERMARK_BLEND` - normal, add, screen or overlay (default: add)
//! - `WATERMARK_ANCHOR` - center or bottom-right (default: center)
//! - `WATERMARK_MARGIN_PERCENT` - Bottom-right inset (default: 5)
//! - `WATERMARK_JPEG_QUALITY` - JPEG output quality (default: 60)
//! - `WATERMARK_OUTPUT_FORMAT` - jpeg or preserve (default: jpeg)
//! - `WATERMARK_MAX_SOURCE_WIDTH` / `WATERMARK_MAX_SOURCE_HEIGHT` - Source limit, 0 disables (default: 10000)
//! - `WATERMARK_MAX_SOURCE_BYTES` - Origin body limit in bytes, 0 disables (default: 52428800)
//! - `WATERMARK_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 86400)

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::origin::{DEFAULT_MAX_ORIGIN_BYTES, DEFAULT_MAX_SOURCE_DIMENSION, DEFAULT_ORIGIN_URL};
use crate::path::{MediaKind, DEFAULT_CONTENT_PREFIX};
use crate::server::DEFAULT_CACHE_MAX_AGE;
use crate::watermark::{
    Anchor, BlendMode, OutputEncoding, ServiceSettings, WatermarkPolicy, DEFAULT_JPEG_QUALITY,
    DEFAULT_MARGIN_PERCENT, DEFAULT_OPACITY, DEFAULT_OVERLAY_FRACTION, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};

// =============================================================================
// Default Values
// =============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 8080;

/// Default origin request timeout in seconds.
pub const DEFAULT_ORIGIN_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_CACHE_DIR: &str = "cache";

pub const DEFAULT_OVERLAY_PATH: &str = "Wanderstories-logo.png";

/// Overlay placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AnchorKind {
    #[default]
    Center,
    BottomRight,
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Watermark Cache - serves watermarked copies of origin images.
///
/// Each image is fetched from the origin on first request, composited with
/// the overlay and stored on disk. Later requests are served from disk.
#[derive(Parser, Debug, Clone)]
#[command(name = "watermark-cache")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "WATERMARK_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "WATERMARK_PORT")]
    pub port: u16,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "WATERMARK_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // Origin Configuration
    // =========================================================================
    /// Base URL of the origin serving the unmodified images.
    #[arg(long, default_value = DEFAULT_ORIGIN_URL, env = "WATERMARK_ORIGIN_URL")]
    pub origin_url: String,

    /// Timeout in seconds for a single origin request.
    #[arg(
        long = "origin-timeout",
        default_value_t = DEFAULT_ORIGIN_TIMEOUT_SECS,
        env = "WATERMARK_ORIGIN_TIMEOUT"
    )]
    pub origin_timeout_secs: u64,

    /// Maximum source width in pixels (0 disables the check).
    #[arg(long, default_value_t = DEFAULT_MAX_SOURCE_DIMENSION, env = "WATERMARK_MAX_SOURCE_WIDTH")]
    pub max_source_width: u32,

    /// Maximum source height in pixels (0 disables the check).
    #[arg(long, default_value_t = DEFAULT_MAX_SOURCE_DIMENSION, env = "WATERMARK_MAX_SOURCE_HEIGHT")]
    pub max_source_height: u32,

    /// Maximum origin response body in bytes (0 disables the check).
    #[arg(long, default_value_t = DEFAULT_MAX_ORIGIN_BYTES, env = "WATERMARK_MAX_SOURCE_BYTES")]
    pub max_source_bytes: u64,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Path prefix under which images are served.
    #[arg(long, default_value = DEFAULT_CONTENT_PREFIX, env = "WATERMARK_CONTENT_PREFIX")]
    pub content_prefix: String,

    /// Directory where watermarked images are stored.
    #[arg(long, default_value = DEFAULT_CACHE_DIR, env = "WATERMARK_CACHE_DIR")]
    pub cache_dir: PathBuf,

    /// Accepted file extensions (comma-separated).
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = [MediaKind::Jpg, MediaKind::Jpeg, MediaKind::Png],
        env = "WATERMARK_EXTENSIONS"
    )]
    pub extensions: Vec<MediaKind>,

    // =========================================================================
    // Watermark Configuration
    // =========================================================================
    /// Overlay image file (PNG with alpha recommended).
    #[arg(long = "overlay", default_value = DEFAULT_OVERLAY_PATH, env = "WATERMARK_OVERLAY")]
    pub overlay_path: PathBuf,

    /// Overlay width as a fraction of the source width.
    #[arg(long, default_value_t = DEFAULT_OVERLAY_FRACTION, env = "WATERMARK_OVERLAY_FRACTION")]
    pub overlay_fraction: f32,

    /// Overlay opacity (0.0 - 1.0).
    #[arg(long, default_value_t = DEFAULT_OPACITY, env = "WATERMARK_OPACITY")]
    pub opacity: f32,

    /// Blend mode.
    #[arg(long, value_enum, default_value_t = BlendMode::default(), env = "WATERMARK_BLEND")]
    pub blend: BlendMode,

    /// Overlay placement.
    #[arg(long, value_enum, default_value_t = AnchorKind::default(), env = "WATERMARK_ANCHOR")]
    pub anchor: AnchorKind,

    /// Inset from the bottom-right corner, as a percentage of the source size.
    #[arg(long, default_value_t = DEFAULT_MARGIN_PERCENT, env = "WATERMARK_MARGIN_PERCENT")]
    pub margin_percent: u32,

    /// JPEG output quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WATERMARK_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Output format: always JPEG, or keep PNG sources as PNG.
    #[arg(long, value_enum, default_value_t = OutputEncoding::default(), env = "WATERMARK_OUTPUT_FORMAT")]
    pub output_format: OutputEncoding,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.content_prefix.starts_with('/') || self.content_prefix.trim_matches('/').is_empty()
        {
            return Err("content_prefix must be an absolute, non-root path like /content/images"
                .to_string());
        }

        if self.extensions.is_empty() {
            return Err("At least one extension must be accepted".to_string());
        }

        if self.origin_timeout_secs == 0 {
            return Err("origin_timeout must be greater than 0".to_string());
        }

        if !(self.overlay_fraction > 0.0 && self.overlay_fraction <= 1.0) {
            return Err("overlay_fraction must be in (0, 1]".to_string());
        }

        if !(0.0..=1.0).contains(&self.opacity) {
            return Err("opacity must be between 0 and 1".to_string());
        }

        if self.margin_percent >= 50 {
            return Err("margin_percent must be less than 50".to_string());
        }

        if !(MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn origin_timeout(&self) -> Duration {
        Duration::from_secs(self.origin_timeout_secs)
    }

    /// Compositing policy from the watermark options.
    pub fn policy(&self) -> WatermarkPolicy {
        let anchor = match self.anchor {
            AnchorKind::Center => Anchor::Center,
            AnchorKind::BottomRight => Anchor::BottomRight {
                margin_percent: self.margin_percent,
            },
        };

        WatermarkPolicy {
            overlay_fraction: self.overlay_fraction,
            opacity: self.opacity,
            blend: self.blend,
            anchor,
            jpeg_quality: self.jpeg_quality,
            encoding: self.output_format,
        }
    }

    /// Source size limit. A zero dimension is unbounded; both zero disables
    /// the check entirely.
    pub fn max_source_dimensions(&self) -> Option<(u32, u32)> {
        let bound = |v: u32| if v == 0 { u32::MAX } else { v };
        match (self.max_source_width, self.max_source_height) {
            (0, 0) => None,
            (w, h) => Some((bound(w), bound(h))),
        }
    }

    /// Origin body limit, `None` when disabled.
    pub fn max_source_bytes(&self) -> Option<u64> {
        (self.max_source_bytes > 0).then_some(self.max_source_bytes)
    }

    /// Explicit settings for the watermark service.
    ///
    /// `cache_root` is passed in rather than taken from `cache_dir` so that
    /// callers can hand over the canonicalized directory.
    pub fn service_settings(&self, cache_root: impl Into<PathBuf>) -> ServiceSettings {
        ServiceSettings {
            content_prefix: self.content_prefix.clone(),
            allowed_kinds: self.extensions.clone(),
            cache_root: cache_root.into(),
            policy: self.policy(),
            max_source_dimensions: self.max_source_dimensions(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
