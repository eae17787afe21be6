//! Overlay compositing.
//!
//! # Design Decisions
//!
//! - **Clamp, never overflow**: an overlay larger than the source is scaled
//!   down to fit inside it before the width-fraction resize, and the final
//!   size is clamped again so the mark never leaves the source bounds.
//!
//! - **One encoding policy**: every output is JPEG at a fixed quality unless
//!   the deployment opts into [`OutputEncoding::Preserve`], which keeps PNG
//!   sources lossless. The policy is applied uniformly to every request.
//!
//! - **Blend then mix**: each blend mode produces a blended colour that is
//!   mixed into the destination by `opacity * overlay_alpha`.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, RgbaImage};

use crate::error::TransformError;
use crate::origin::SourceAsset;
use crate::path::MediaKind;

/// Default overlay width as a fraction of the source width (one-fifth).
pub const DEFAULT_OVERLAY_FRACTION: f32 = 0.2;

/// Default overlay opacity.
pub const DEFAULT_OPACITY: f32 = 0.2;

/// Default JPEG output quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 60;

/// Default bottom-right margin as a percentage of the source size.
pub const DEFAULT_MARGIN_PERCENT: u32 = 5;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Policy
// =============================================================================

/// How overlay colours combine with the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BlendMode {
    /// Plain source-over
    Normal,
    /// Additive, saturating at white
    #[default]
    Add,
    Screen,
    Overlay,
}

impl BlendMode {
    /// Blend one normalized channel of the overlay (`s`) onto the
    /// destination (`d`).
    pub fn blend(self, s: f32, d: f32) -> f32 {
        match self {
            BlendMode::Normal => s,
            BlendMode::Add => (s + d).min(1.0),
            BlendMode::Screen => 1.0 - (1.0 - s) * (1.0 - d),
            BlendMode::Overlay => {
                if d < 0.5 {
                    2.0 * s * d
                } else {
                    1.0 - 2.0 * (1.0 - s) * (1.0 - d)
                }
            }
        }
    }
}

/// Where the overlay is placed on the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    #[default]
    Center,
    /// Bottom-right corner, inset by a percentage of the source size
    BottomRight { margin_percent: u32 },
}

impl Anchor {
    /// Top-left position of an `ow`x`oh` overlay on an `sw`x`sh` source.
    pub fn position(self, sw: u32, sh: u32, ow: u32, oh: u32) -> (u32, u32) {
        match self {
            Anchor::Center => (sw.saturating_sub(ow) / 2, sh.saturating_sub(oh) / 2),
            Anchor::BottomRight { margin_percent } => {
                let mx = (sw as u64 * margin_percent as u64 / 100) as u32;
                let my = (sh as u64 * margin_percent as u64 / 100) as u32;
                (
                    sw.saturating_sub(ow).saturating_sub(mx),
                    sh.saturating_sub(oh).saturating_sub(my),
                )
            }
        }
    }
}

/// Output format policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputEncoding {
    /// Everything is re-encoded as JPEG
    #[default]
    Jpeg,
    /// PNG sources stay PNG, JPEG sources stay JPEG
    Preserve,
}

impl OutputEncoding {
    /// Whether a source of this kind is written as PNG.
    pub fn writes_png(self, source: MediaKind) -> bool {
        self == OutputEncoding::Preserve && source.is_png()
    }

    /// MIME type of the artifact produced for a source of this kind.
    pub fn content_type(self, source: MediaKind) -> &'static str {
        if self.writes_png(source) {
            "image/png"
        } else {
            "image/jpeg"
        }
    }
}

/// MIME type of an encoded artifact, read from its magic bytes.
///
/// `None` if the bytes are neither JPEG nor PNG.
pub fn artifact_content_type(data: &[u8]) -> Option<&'static str> {
    image::guess_format(data)
        .ok()
        .and_then(MediaKind::from_image_format)
        .map(MediaKind::content_type)
}

/// Fixed compositing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkPolicy {
    /// Overlay width as a fraction of source width, in (0, 1]
    pub overlay_fraction: f32,
    /// Overlay opacity, in [0, 1]
    pub opacity: f32,
    pub blend: BlendMode,
    pub anchor: Anchor,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    pub encoding: OutputEncoding,
}

impl Default for WatermarkPolicy {
    fn default() -> Self {
        Self {
            overlay_fraction: DEFAULT_OVERLAY_FRACTION,
            opacity: DEFAULT_OPACITY,
            blend: BlendMode::default(),
            anchor: Anchor::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            encoding: OutputEncoding::default(),
        }
    }
}

// =============================================================================
// Overlay Asset
// =============================================================================

/// The decoded watermark image, shared read-only by all transforms.
#[derive(Debug, Clone)]
pub struct OverlayAsset {
    image: Arc<RgbaImage>,
}

impl OverlayAsset {
    /// Decode an overlay from encoded bytes (PNG or JPEG).
    pub fn from_bytes(data: &[u8]) -> Result<Self, TransformError> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| TransformError::Decode {
                message: e.to_string(),
            })?;
        let image = reader.decode().map_err(|e| TransformError::Decode {
            message: e.to_string(),
        })?;

        Self::from_image(image.to_rgba8())
    }

    pub fn from_image(image: RgbaImage) -> Result<Self, TransformError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(TransformError::InvalidDimensions { width, height });
        }
        Ok(Self {
            image: Arc::new(image),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

// =============================================================================
// Compositor
// =============================================================================

/// Produces watermarked output from a source asset and the overlay.
///
/// Stateless apart from its policy, so it is cheap to clone into a
/// blocking task.
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    policy: WatermarkPolicy,
}

impl Compositor {
    pub fn new(policy: WatermarkPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &WatermarkPolicy {
        &self.policy
    }

    /// Decode the source, composite the resized overlay and re-encode.
    ///
    /// # Errors
    ///
    /// Returns `TransformError` if the source cannot be decoded or the output
    /// cannot be encoded. A successful result is never empty.
    pub fn composite(
        &self,
        source: &SourceAsset,
        overlay: &OverlayAsset,
    ) -> Result<Bytes, TransformError> {
        let decoded = image::load_from_memory_with_format(&source.data, source.kind.image_format())
            .map_err(|e| TransformError::Decode {
                message: e.to_string(),
            })?;
        let mut canvas = decoded.to_rgba8();
        let (sw, sh) = canvas.dimensions();

        let (ov_w, ov_h) = overlay.dimensions();
        let (ow, oh) = overlay_dimensions(sw, sh, ov_w, ov_h, self.policy.overlay_fraction)?;
        let mark = imageops::resize(overlay.image(), ow, oh, FilterType::Lanczos3);

        let (x, y) = self.policy.anchor.position(sw, sh, ow, oh);
        blend_onto(&mut canvas, &mark, x, y, self.policy.blend, self.policy.opacity);

        self.encode(canvas, source.kind)
    }

    fn encode(&self, canvas: RgbaImage, kind: MediaKind) -> Result<Bytes, TransformError> {
        let mut output = Vec::new();

        let result = if self.policy.encoding.writes_png(kind) {
            canvas.write_with_encoder(PngEncoder::new(&mut output))
        } else {
            let quality = self.policy.jpeg_quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY);
            DynamicImage::ImageRgba8(canvas)
                .to_rgb8()
                .write_with_encoder(JpegEncoder::new_with_quality(&mut output, quality))
        };
        result.map_err(|e| TransformError::Encode {
            message: e.to_string(),
        })?;

        if output.is_empty() {
            return Err(TransformError::Encode {
                message: "encoder produced no output".to_string(),
            });
        }

        Ok(Bytes::from(output))
    }
}

/// Final overlay size for a source of `sw`x`sh`.
///
/// The overlay is first fitted inside the source, then scaled (keeping its
/// aspect ratio) to `fraction` of the source width, and finally clamped so
/// its height also fits.
pub fn overlay_dimensions(
    sw: u32,
    sh: u32,
    ov_w: u32,
    ov_h: u32,
    fraction: f32,
) -> Result<(u32, u32), TransformError> {
    if sw == 0 || sh == 0 {
        return Err(TransformError::InvalidDimensions {
            width: sw,
            height: sh,
        });
    }
    if ov_w == 0 || ov_h == 0 {
        return Err(TransformError::InvalidDimensions {
            width: ov_w,
            height: ov_h,
        });
    }

    let (sw_f, sh_f) = (sw as f64, sh as f64);
    let (mut w, mut h) = (ov_w as f64, ov_h as f64);

    if w > sw_f || h > sh_f {
        let fit = (sw_f / w).min(sh_f / h);
        w *= fit;
        h *= fit;
    }

    let target_w = (sw_f * fraction.clamp(0.0, 1.0) as f64).max(1.0);
    h *= target_w / w;
    w = target_w;

    if h > sh_f {
        w *= sh_f / h;
        h = sh_f;
    }

    let w = (w.round() as u32).clamp(1, sw);
    let h = (h.round() as u32).clamp(1, sh);
    Ok((w, h))
}

/// Blend `mark` onto `canvas` with its top-left corner at (`x`, `y`).
///
/// Pixels falling outside the canvas are skipped.
fn blend_onto(
    canvas: &mut RgbaImage,
    mark: &RgbaImage,
    x: u32,
    y: u32,
    mode: BlendMode,
    opacity: f32,
) {
    let opacity = opacity.clamp(0.0, 1.0);
    let (cw, ch) = canvas.dimensions();

    for (mx, my, src) in mark.enumerate_pixels() {
        let (cx, cy) = (x + mx, y + my);
        if cx >= cw || cy >= ch {
            continue;
        }

        let alpha = src[3] as f32 / 255.0 * opacity;
        if alpha <= 0.0 {
            continue;
        }

        let dst = canvas.get_pixel_mut(cx, cy);
        for c in 0..3 {
            let s = src[c] as f32 / 255.0;
            let d = dst[c] as f32 / 255.0;
            let out = d + (mode.blend(s, d) - d) * alpha;
            dst[c] = to_channel(out);
        }
        let da = dst[3] as f32 / 255.0;
        dst[3] = to_channel(da + alpha * (1.0 - da));
    }
}

#[inline]
fn to_channel(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

// =============================================================================
// Tests
// =============================================================================
