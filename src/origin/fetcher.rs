use std::io::Cursor;

use bytes::Bytes;
use image::ImageReader;
use tracing::{debug, warn};

use super::OriginSource;
use crate::error::{FetchError, TransformError, WatermarkError};
use crate::path::{AssetLocator, MediaKind};

/// Default maximum width and height of a source image.
pub const DEFAULT_MAX_SOURCE_DIMENSION: u32 = 10_000;

/// Unmodified source bytes plus their header dimensions.
///
/// `kind` is the format found in the bytes themselves, which may differ
/// from the extension in the request path. Obtained once per fetch and
/// dropped after compositing.
#[derive(Debug, Clone)]
pub struct SourceAsset {
    pub data: Bytes,
    pub kind: MediaKind,
    pub width: u32,
    pub height: u32,
}

impl SourceAsset {
    /// Detect the format from the magic bytes and read dimensions from the
    /// image header without decoding pixels.
    ///
    /// Only JPEG and PNG are accepted; anything else is a decode error.
    pub fn from_bytes(data: Bytes) -> Result<Self, TransformError> {
        let decode_err = |message: String| TransformError::Decode { message };

        let reader = ImageReader::new(Cursor::new(data.as_ref()))
            .with_guessed_format()
            .map_err(|e| decode_err(e.to_string()))?;

        let kind = match reader.format() {
            Some(format) => MediaKind::from_image_format(format)
                .ok_or_else(|| decode_err(format!("unsupported source format: {:?}", format)))?,
            None => return Err(decode_err("unrecognized image format".to_string())),
        };

        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| decode_err(e.to_string()))?;

        Ok(Self {
            data,
            kind,
            width,
            height,
        })
    }
}

/// Retrieves source assets and enforces the size policy.
pub struct OriginFetcher<S: OriginSource> {
    source: S,
    max_dimensions: Option<(u32, u32)>,
}

impl<S: OriginSource> OriginFetcher<S> {
    /// Create a fetcher.
    ///
    /// # Arguments
    /// * `source` - Where raw bytes come from
    /// * `max_dimensions` - Optional `(width, height)` limit on sources
    pub fn new(source: S, max_dimensions: Option<(u32, u32)>) -> Self {
        Self {
            source,
            max_dimensions,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch a source asset and check it against the size policy.
    ///
    /// Oversized sources fail with `FetchError::TooLarge` before any pixel
    /// data is decoded.
    pub async fn fetch(&self, locator: &AssetLocator) -> Result<SourceAsset, WatermarkError> {
        let data = self.source.fetch(locator).await.map_err(|e| {
            warn!(path = locator.relative_path(), error = %e, "Origin fetch failed");
            e
        })?;

        let asset = SourceAsset::from_bytes(data)?;
        if asset.kind.image_format() != locator.kind().image_format() {
            debug!(
                path = locator.relative_path(),
                detected = ?asset.kind,
                "Source format differs from its extension"
            );
        }

        if let Some((max_width, max_height)) = self.max_dimensions {
            if asset.width > max_width || asset.height > max_height {
                return Err(FetchError::TooLarge {
                    width: asset.width,
                    height: asset.height,
                    max_width,
                    max_height,
                }
                .into());
            }
        }

        Ok(asset)
    }
}

// =============================================================================
// Tests
// =============================================================================
