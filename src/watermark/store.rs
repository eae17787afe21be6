//! Write-once artifact store on the local filesystem.
//!
//! Artifacts live at the cache path of their [`AssetLocator`], mirroring the
//! logical asset path under the cache root. Writes go to a temporary file in
//! the same directory and are renamed into place, so readers only ever see
//! complete files and a crash mid-write leaves nothing at the final path.
//! The write itself runs on the blocking pool and cleans up its temp file on
//! failure, so dropping the calling future never leaves one behind.
//!
//! There is no update or delete path. Invalidation happens out of band.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::path::AssetLocator;

/// Persistent store for watermarked artifacts.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    tmp_seq: AtomicU64,
}

impl CacheStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether an artifact is persisted for this locator.
    pub async fn exists(&self, locator: &AssetLocator) -> bool {
        match fs::metadata(locator.cache_path()).await {
            Ok(meta) => meta.is_file(),
            Err(_) => false,
        }
    }

    /// Read a persisted artifact.
    pub async fn read(&self, locator: &AssetLocator) -> Result<Bytes, StoreError> {
        let path = self.checked_path(locator)?;
        fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| StoreError::Read {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    /// Persist an artifact if none exists yet.
    ///
    /// Missing parent directories are created. An existing artifact is left
    /// untouched, so the first complete write wins.
    pub async fn put(&self, locator: &AssetLocator, data: &[u8]) -> Result<(), StoreError> {
        let path = self.checked_path(locator)?;
        let write_err = |message: String| StoreError::Write {
            path: path.display().to_string(),
            message,
        };

        if data.is_empty() {
            return Err(write_err("refusing to persist an empty artifact".to_string()));
        }
        if self.exists(locator).await {
            debug!(path = locator.relative_path(), "Artifact already persisted");
            return Ok(());
        }

        let parent = path
            .parent()
            .ok_or_else(|| write_err("artifact path has no parent".to_string()))?;
        fs::create_dir_all(parent)
            .await
            .map_err(|e| write_err(e.to_string()))?;

        // The write runs to completion on the blocking pool even if this
        // future is dropped, so a cancelled fill never strands a temp file.
        let tmp = TempFile::new(self.tmp_path(path));
        let target = path.to_path_buf();
        let data = Bytes::copy_from_slice(data);
        tokio::task::spawn_blocking(move || write_atomically(tmp, &target, &data))
            .await
            .map_err(|e| write_err(format!("write task failed: {}", e)))?
            .map_err(|e| write_err(e.to_string()))
    }

    fn checked_path<'a>(&self, locator: &'a AssetLocator) -> Result<&'a Path, StoreError> {
        let path = locator.cache_path();
        if path.starts_with(&self.root) && path != self.root {
            Ok(path)
        } else {
            Err(StoreError::OutsideRoot {
                path: locator.relative_path().to_string(),
            })
        }
    }

    /// A sibling path unique to this process and write.
    fn tmp_path(&self, path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifact");
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), seq))
    }
}

/// Write `data` to the temp file, flush it to disk, then rename it over
/// `target`. The temp file is removed on any failure.
fn write_atomically(tmp: TempFile, target: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(tmp.path())?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(tmp.path(), target)?;
    tmp.persisted();
    Ok(())
}

/// A temporary file that is deleted on drop unless it was renamed into place.
#[derive(Debug)]
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// The file now lives at its final path; nothing to clean up.
    fn persisted(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove temporary file");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
