//! HTTP(S) origin backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use super::OriginSource;
use crate::error::FetchError;
use crate::path::AssetLocator;

/// Default origin base URL.
pub const DEFAULT_ORIGIN_URL: &str = "https://wanderstories.space";

/// Default timeout for a whole origin request.
pub const DEFAULT_ORIGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default limit on an origin response body (50 MiB).
pub const DEFAULT_MAX_ORIGIN_BYTES: u64 = 50 * 1024 * 1024;

/// Origin reachable over HTTP(S) at a fixed base URL.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use watermark_cache::origin::HttpOrigin;
///
/// let origin = HttpOrigin::new("https://example.com", Duration::from_secs(10))?;
/// let bytes = origin.fetch(&locator).await?;
/// ```
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
    base_url: Url,
    max_body_bytes: Option<u64>,
}

impl HttpOrigin {
    /// Create an origin client for the given base URL.
    ///
    /// The timeout bounds the entire request, body included.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::Transport(format!("invalid origin URL: {}", e)))?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(FetchError::Transport(format!(
                "unsupported origin scheme: {}",
                base_url.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("watermark-cache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            max_body_bytes: Some(DEFAULT_MAX_ORIGIN_BYTES),
        })
    }

    /// Limit the size of a response body. `None` disables the limit.
    pub fn with_max_body_bytes(mut self, max_body_bytes: Option<u64>) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn max_body_bytes(&self) -> Option<u64> {
        self.max_body_bytes
    }

    /// Build the origin URL for a locator.
    pub fn origin_url(&self, locator: &AssetLocator) -> Url {
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", base_path, encode_segments(locator.segments())));
        url.set_query(None);
        url.set_fragment(None);
        url
    }
}

/// Percent-encode each segment on its own, then join with `/`.
pub fn encode_segments<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| urlencoding::encode(s.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl OriginSource for HttpOrigin {
    async fn fetch(&self, locator: &AssetLocator) -> Result<Bytes, FetchError> {
        let url = self.origin_url(locator);
        debug!(url = %url, "Fetching from origin");

        let mut response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Transport(format!("timed out fetching {}", locator.relative_path()))
            } else {
                FetchError::Transport(format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(FetchError::NotFound(locator.relative_path().to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Transport(format!(
                "origin returned {} for {}",
                status,
                locator.relative_path()
            )));
        }

        let Some(max_bytes) = self.max_body_bytes else {
            return response
                .bytes()
                .await
                .map_err(|e| FetchError::Transport(format!("failed to read body: {}", e)));
        };

        // Reject up front when the origin declares an oversized body, then
        // enforce the limit while streaming in case it did not.
        if let Some(declared) = response.content_length() {
            if declared > max_bytes {
                return Err(FetchError::BodyTooLarge {
                    bytes: declared,
                    max_bytes,
                });
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Transport(format!("failed to read body: {}", e)))?
        {
            let received = (body.len() + chunk.len()) as u64;
            if received > max_bytes {
                return Err(FetchError::BodyTooLarge {
                    bytes: received,
                    max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body.freeze())
    }

    fn describe(&self) -> String {
        self.base_url.to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
