use std::path::{Component, Path, PathBuf};

use crate::error::ResolveError;

/// Default served content prefix.
pub const DEFAULT_CONTENT_PREFIX: &str = "/content/images";

/// Every media kind the service can handle.
pub const SUPPORTED_MEDIA_KINDS: &[MediaKind] = &[MediaKind::Jpg, MediaKind::Jpeg, MediaKind::Png];

// =============================================================================
// Media Kind
// =============================================================================

/// Allow-listed file extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum MediaKind {
    Jpg,
    Jpeg,
    Png,
}

impl MediaKind {
    /// Match a file extension, ignoring ASCII case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" => Some(MediaKind::Jpg),
            "jpeg" => Some(MediaKind::Jpeg),
            "png" => Some(MediaKind::Png),
            _ => None,
        }
    }

    /// Map a detected decoder format back to a supported kind.
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(MediaKind::Jpeg),
            image::ImageFormat::Png => Some(MediaKind::Png),
            _ => None,
        }
    }

    /// The decoder format for this extension.
    pub fn image_format(self) -> image::ImageFormat {
        match self {
            MediaKind::Jpg | MediaKind::Jpeg => image::ImageFormat::Jpeg,
            MediaKind::Png => image::ImageFormat::Png,
        }
    }

    /// MIME type of an image in this format.
    pub fn content_type(self) -> &'static str {
        match self {
            MediaKind::Jpg | MediaKind::Jpeg => "image/jpeg",
            MediaKind::Png => "image/png",
        }
    }

    pub fn is_png(self) -> bool {
        matches!(self, MediaKind::Png)
    }
}

// =============================================================================
// Asset Locator
// =============================================================================

/// A validated, canonical identifier for one source asset.
///
/// Carries the decoded segments, the relative path used to address the
/// origin, and the absolute cache file path. All three come from the same
/// validated segment list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocator {
    segments: Vec<String>,
    relative: String,
    kind: MediaKind,
    cache_path: PathBuf,
}

impl AssetLocator {
    /// Decoded path segments, prefix included.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Canonical relative path, e.g. `content/images/2021/foo.jpg`.
    ///
    /// Doubles as the single-flight key.
    pub fn relative_path(&self) -> &str {
        &self.relative
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Absolute path of the cached artifact.
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }
}

// =============================================================================
// Path Resolver
// =============================================================================

/// Validates request paths and maps them to [`AssetLocator`]s.
#[derive(Debug, Clone)]
pub struct PathResolver {
    prefix: Vec<String>,
    allowed: Vec<MediaKind>,
    cache_root: PathBuf,
}

impl PathResolver {
    /// Create a resolver.
    ///
    /// # Arguments
    /// * `prefix` - Served content prefix, e.g. `/content/images`
    /// * `allowed` - Accepted extensions (a subset of [`SUPPORTED_MEDIA_KINDS`])
    /// * `cache_root` - Root directory of the artifact tree
    pub fn new(prefix: &str, allowed: &[MediaKind], cache_root: impl Into<PathBuf>) -> Self {
        let prefix = prefix
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            prefix,
            allowed: allowed.to_vec(),
            cache_root: cache_root.into(),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Resolve a request path into an asset locator.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the path does not start with the content prefix
    /// - `InvalidRequest` if a segment is empty, undecodable, contains a
    ///   character outside `[A-Za-z0-9._-]`, or is a `.`/`..` segment
    /// - `UnsupportedType` if the extension is not allowed
    pub fn resolve(&self, request_path: &str) -> Result<AssetLocator, ResolveError> {
        let trimmed = request_path.strip_prefix('/').unwrap_or(request_path);

        let mut segments = Vec::new();
        for raw in trimmed.split('/') {
            let decoded = urlencoding::decode(raw).map_err(|_| ResolveError::InvalidRequest {
                reason: "segment is not valid UTF-8 after decoding".to_string(),
            })?;
            segments.push(decoded.into_owned());
        }

        // The prefix is matched on decoded segments so "%63ontent" is treated
        // like "content"; anything else is simply not ours.
        let has_prefix = segments.len() > self.prefix.len()
            && segments.iter().zip(&self.prefix).all(|(s, p)| s == p);
        if !has_prefix {
            return Err(ResolveError::NotFound {
                path: request_path.to_string(),
            });
        }

        for segment in &segments[self.prefix.len()..] {
            validate_segment(segment)?;
        }

        let file_name = segments.last().map(String::as_str).unwrap_or_default();
        let extension = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext,
            Some(_) => {
                return Err(ResolveError::InvalidRequest {
                    reason: "file name has no stem".to_string(),
                })
            }
            None => "",
        };

        let kind = MediaKind::from_extension(extension)
            .filter(|k| self.allowed.contains(k))
            .ok_or_else(|| ResolveError::UnsupportedType {
                extension: extension.to_ascii_lowercase(),
            })?;

        let cache_path = self.cache_root.join(segments.iter().collect::<PathBuf>());
        if !is_strict_descendant(&self.cache_root, &cache_path) {
            return Err(ResolveError::InvalidRequest {
                reason: "path escapes the cache root".to_string(),
            });
        }

        Ok(AssetLocator {
            relative: segments.join("/"),
            segments,
            kind,
            cache_path,
        })
    }
}

fn validate_segment(segment: &str) -> Result<(), ResolveError> {
    if segment.is_empty() {
        return Err(ResolveError::InvalidRequest {
            reason: "empty path segment".to_string(),
        });
    }
    if segment == "." || segment == ".." {
        return Err(ResolveError::InvalidRequest {
            reason: "traversal segment".to_string(),
        });
    }
    if let Some(c) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(ResolveError::InvalidRequest {
            reason: format!("disallowed character {:?}", c),
        });
    }
    Ok(())
}

/// True when `candidate` lies below `root` using only normal components.
fn is_strict_descendant(root: &Path, candidate: &Path) -> bool {
    match candidate.strip_prefix(root) {
        Ok(rest) => {
            rest.components().next().is_some()
                && rest.components().all(|c| matches!(c, Component::Normal(_)))
        }
        Err(_) => false,
    }
}

// =============================================================================
// Tests
// =============================================================================
