use thiserror::Error;

/// Errors raised while validating an inbound request path.
///
/// These are detected before any network or filesystem access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Path does not start with the served content prefix
    #[error("Path is outside the served prefix: {path}")]
    NotFound { path: String },

    /// Path is malformed or could escape the cache root
    #[error("Invalid request path: {reason}")]
    InvalidRequest { reason: String },

    /// Extension is not on the allow-list
    #[error("Unsupported file type: {extension}")]
    UnsupportedType { extension: String },
}

/// Errors from retrieving a source asset from the origin.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Origin has no such asset
    #[error("Asset not found at origin: {0}")]
    NotFound(String),

    /// Origin unreachable, timed out, or answered with a non-success status
    #[error("Origin transport error: {0}")]
    Transport(String),

    /// Source image exceeds the configured dimension limits
    #[error("Source too large: {width}x{height} exceeds {max_width}x{max_height}")]
    TooLarge {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    /// Source body exceeds the configured byte limit
    #[error("Source body too large: {bytes} bytes exceeds {max_bytes}")]
    BodyTooLarge { bytes: u64, max_bytes: u64 },
}

/// Errors from decoding, compositing or encoding images.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    /// Source or overlay bytes could not be decoded
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Output could not be encoded
    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    /// Image has a zero dimension
    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Errors from the on-disk artifact store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Reading a persisted artifact failed
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    /// Persisting an artifact failed
    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },

    /// Target path is not inside the cache root
    #[error("Path is outside the cache root: {path}")]
    OutsideRoot { path: String },
}

/// Errors surfaced by the watermark service.
///
/// Cloneable so that every request waiting on the same cache fill receives
/// the same outcome.
#[derive(Debug, Clone, Error)]
pub enum WatermarkError {
    /// Request path was rejected before any I/O
    #[error(transparent)]
    Rejected(#[from] ResolveError),

    /// Origin retrieval failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Compositing failed
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Persisting or reading the artifact failed
    #[error(transparent)]
    Persist(#[from] StoreError),

    /// The fill task failed outside the pipeline (panic or abandonment)
    #[error("Internal error: {0}")]
    Internal(String),
}
