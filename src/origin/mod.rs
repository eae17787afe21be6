//! Origin retrieval layer.
//!
//! The origin is consumed read-only, one asset per request:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             OriginFetcher               │
//! │  (sniff format, enforce max size)       │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │         OriginSource trait              │
//! │  (raw bytes for a validated locator)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   HttpOrigin (reqwest, bounded timeout) │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Each fetch is a single attempt. Failures are reported to the caller and
//! never cached.

mod fetcher;
mod http_origin;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FetchError;
use crate::path::AssetLocator;

pub use fetcher::{OriginFetcher, SourceAsset, DEFAULT_MAX_SOURCE_DIMENSION};
pub use http_origin::{
    encode_segments, HttpOrigin, DEFAULT_MAX_ORIGIN_BYTES, DEFAULT_ORIGIN_TIMEOUT, DEFAULT_ORIGIN_URL,
};

/// A store that can return the unmodified bytes of a source asset.
///
/// Implementations must distinguish a missing asset (`FetchError::NotFound`)
/// from transport failures (`FetchError::Transport`).
#[async_trait]
pub trait OriginSource: Send + Sync {
    /// Retrieve the raw bytes for a validated locator.
    async fn fetch(&self, locator: &AssetLocator) -> Result<Bytes, FetchError>;

    /// Human-readable description of the origin, used in logs.
    fn describe(&self) -> String;
}
