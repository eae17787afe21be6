//! Watermark service: orchestrates the fetch-transform-persist-serve pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      WatermarkService                           │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                      handle()                           │    │
//! │  │  1. Resolve path      4. Fetch from origin              │    │
//! │  │  2. Check store       5. Composite (blocking pool)      │    │
//! │  │  3. Join/lead fill    6. Persist & return               │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │        │              │               │               │         │
//! │        ▼              ▼               ▼               ▼         │
//! │ ┌────────────┐ ┌────────────┐ ┌───────────────┐ ┌────────────┐  │
//! │ │PathResolver│ │ CacheStore │ │ OriginFetcher │ │ Compositor │  │
//! │ └────────────┘ └────────────┘ └───────────────┘ └────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Single-flight
//!
//! Concurrent misses on the same key share one fill. The first request
//! registers a completion channel and becomes the leader; later requests
//! subscribe to it and receive the same outcome. The registry lock is held
//! only to look up, insert or remove an entry, never across I/O.
//!
//! The entry is removed when the leader finishes, whether it succeeded,
//! failed or was dropped. Failures are therefore never cached, and if a
//! leader is abandoned its waiters start over.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::WatermarkError;
use crate::origin::{OriginFetcher, OriginSource, DEFAULT_MAX_SOURCE_DIMENSION};
use crate::path::{AssetLocator, MediaKind, PathResolver, DEFAULT_CONTENT_PREFIX, SUPPORTED_MEDIA_KINDS};

use super::compositor::{artifact_content_type, Compositor, OverlayAsset, WatermarkPolicy};
use super::store::CacheStore;

type FillResult = Result<Bytes, WatermarkError>;
type FillReceiver = watch::Receiver<Option<FillResult>>;

// =============================================================================
// Settings
// =============================================================================

/// Explicit configuration for a [`WatermarkService`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Served content prefix, e.g. `/content/images`
    pub content_prefix: String,

    /// Accepted extensions
    pub allowed_kinds: Vec<MediaKind>,

    /// Root of the artifact tree
    pub cache_root: PathBuf,

    /// Compositing parameters
    pub policy: WatermarkPolicy,

    /// Optional `(width, height)` limit on source images
    pub max_source_dimensions: Option<(u32, u32)>,
}

impl ServiceSettings {
    /// Settings with default policy and limits for the given cache root.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            content_prefix: DEFAULT_CONTENT_PREFIX.to_string(),
            allowed_kinds: SUPPORTED_MEDIA_KINDS.to_vec(),
            cache_root: cache_root.into(),
            policy: WatermarkPolicy::default(),
            max_source_dimensions: Some((DEFAULT_MAX_SOURCE_DIMENSION, DEFAULT_MAX_SOURCE_DIMENSION)),
        }
    }

    pub fn with_policy(mut self, policy: WatermarkPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_source_dimensions(mut self, max: Option<(u32, u32)>) -> Self {
        self.max_source_dimensions = max;
        self
    }
}

// =============================================================================
// Response
// =============================================================================

/// A served artifact.
#[derive(Debug, Clone)]
pub struct WatermarkResponse {
    /// Encoded, watermarked image
    pub data: Bytes,

    /// MIME type of `data`
    pub content_type: &'static str,

    /// Whether the artifact was already persisted when the request arrived
    pub cache_hit: bool,
}

// =============================================================================
// Service
// =============================================================================

/// Serves watermarked images, filling the cache at most once per asset.
///
/// # Example
///
/// ```ignore
/// use watermark_cache::origin::HttpOrigin;
/// use watermark_cache::watermark::{OverlayAsset, ServiceSettings, WatermarkService};
///
/// let origin = HttpOrigin::new("https://example.com", Duration::from_secs(10))?;
/// let overlay = OverlayAsset::from_bytes(&std::fs::read("logo.png")?)?;
/// let service = WatermarkService::new(origin, overlay, ServiceSettings::new("/var/cache/wm"));
///
/// let response = service.handle("/content/images/2021/foo.jpg").await?;
/// println!("{} bytes, cache hit: {}", response.data.len(), response.cache_hit);
/// ```
pub struct WatermarkService<S: OriginSource> {
    resolver: PathResolver,
    fetcher: OriginFetcher<S>,
    compositor: Compositor,
    overlay: OverlayAsset,
    store: CacheStore,

    /// In-flight fills keyed by relative path
    in_flight: Mutex<HashMap<String, FillReceiver>>,
}

enum Role {
    Leader(watch::Sender<Option<FillResult>>),
    Waiter(FillReceiver),
}

/// Removes the in-flight entry when the leader finishes or is dropped.
struct InFlightGuard<'a> {
    registry: &'a Mutex<HashMap<String, FillReceiver>>,
    key: &'a str,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.key);
    }
}

impl<S: OriginSource> WatermarkService<S> {
    /// Create a service from an origin, the overlay and explicit settings.
    pub fn new(source: S, overlay: OverlayAsset, settings: ServiceSettings) -> Self {
        Self {
            resolver: PathResolver::new(
                &settings.content_prefix,
                &settings.allowed_kinds,
                settings.cache_root.clone(),
            ),
            fetcher: OriginFetcher::new(source, settings.max_source_dimensions),
            compositor: Compositor::new(settings.policy),
            overlay,
            store: CacheStore::new(settings.cache_root),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Serve the watermarked artifact for a request path.
    ///
    /// Cache hits are read straight from the store. Misses join or lead a
    /// single-flight fill for the asset.
    ///
    /// # Errors
    ///
    /// - `Rejected` for invalid paths, before any I/O
    /// - `Fetch` if the origin is missing the asset, unreachable, or the
    ///   source exceeds the size limit
    /// - `Transform` if decoding or encoding fails
    /// - `Persist` if the artifact cannot be written or read
    pub async fn handle(&self, request_path: &str) -> Result<WatermarkResponse, WatermarkError> {
        let locator = self.resolver.resolve(request_path)?;

        let (data, cache_hit) = if self.store.exists(&locator).await {
            let data = self.store.read(&locator).await?;
            debug!(path = locator.relative_path(), "Cache hit");
            (data, true)
        } else {
            (self.fill(&locator).await?, false)
        };

        // The artifact's own bytes decide its type, whatever the path says
        // or whichever policy wrote it.
        let content_type = artifact_content_type(&data).unwrap_or_else(|| {
            self.compositor.policy().encoding.content_type(locator.kind())
        });

        Ok(WatermarkResponse {
            data,
            content_type,
            cache_hit,
        })
    }

    /// Join the in-flight fill for this locator, or lead a new one.
    async fn fill(&self, locator: &AssetLocator) -> FillResult {
        let key = locator.relative_path();

        loop {
            let role = {
                let mut in_flight = self.lock_in_flight();
                match in_flight.get(key) {
                    Some(rx) => Role::Waiter(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        in_flight.insert(key.to_string(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    let _guard = InFlightGuard {
                        registry: &self.in_flight,
                        key,
                    };
                    let result = self.run_fill(locator).await;
                    tx.send_replace(Some(result.clone()));
                    return result;
                }
                Role::Waiter(mut rx) => {
                    debug!(path = key, "Joining in-flight fill");
                    let outcome = rx.wait_for(Option::is_some).await.map(|v| v.clone());
                    match outcome {
                        Ok(Some(result)) => return result,
                        _ => debug!(path = key, "Fill abandoned, retrying"),
                    }
                }
            }
        }
    }

    /// Fetch, composite and persist one asset.
    async fn run_fill(&self, locator: &AssetLocator) -> FillResult {
        // A fill may have completed between the cache check and registration.
        if self.store.exists(locator).await {
            return Ok(self.store.read(locator).await?);
        }

        let started = Instant::now();
        let source = self.fetcher.fetch(locator).await?;
        let (width, height) = (source.width, source.height);

        let compositor = self.compositor.clone();
        let overlay = self.overlay.clone();
        let output = tokio::task::spawn_blocking(move || compositor.composite(&source, &overlay))
            .await
            .map_err(|e| WatermarkError::Internal(format!("transform task failed: {}", e)))??;

        self.store.put(locator, &output).await?;

        info!(
            path = locator.relative_path(),
            width,
            height,
            bytes = output.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cache fill complete"
        );

        Ok(output)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<String, FillReceiver>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of fills currently in progress.
    pub fn in_flight_count(&self) -> usize {
        self.lock_in_flight().len()
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn origin(&self) -> &S {
        self.fetcher.source()
    }

    pub fn policy(&self) -> &WatermarkPolicy {
        self.compositor.policy()
    }
}

// =============================================================================
// Tests
// =============================================================================
