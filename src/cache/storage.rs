//! Cache storage trait and filesystem implementation.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::traits::{CacheKey, CacheStats, CacheStatsSnapshot};

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Look up the payload stored for exactly this key.
  ///
  /// Counts a hit or a miss. An entry that exists but cannot be read counts as
  /// a miss and is reported as an error.
  fn get(&self, key: &CacheKey) -> Result<Option<Value>>;

  /// Store a payload. An entry already present for the key is left as is.
  fn put(&self, key: &CacheKey, payload: &Value) -> Result<()>;

  fn stats(&self) -> CacheStatsSnapshot;

  /// Remove every entry and reset the counters.
  fn clear(&self) -> Result<()>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - every lookup is a miss.
#[derive(Default)]
pub struct NoopStorage {
  stats: CacheStats,
}

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &CacheKey) -> Result<Option<Value>> {
    self.stats.record_miss();
    Ok(None)
  }

  fn put(&self, _key: &CacheKey, _payload: &Value) -> Result<()> {
    Ok(()) // Discard
  }

  fn stats(&self) -> CacheStatsSnapshot {
    self.stats.snapshot()
  }

  fn clear(&self) -> Result<()> {
    self.stats.reset();
    Ok(())
  }
}

/// Filesystem cache: one JSON document per entry, grouped by parent.
///
/// Layout: `<root>/pr_<parent>/<sha256(url)>_<sha256(watermark)[..16]>.json`
pub struct FileStorage {
  root: PathBuf,
  stats: CacheStats,
  tmp_seq: AtomicU64,
}

impl FileStorage {
  /// Open a store rooted at `root`. Directories are created on first write.
  pub fn open(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      stats: CacheStats::default(),
      tmp_seq: AtomicU64::new(0),
    }
  }

  /// Get the default cache root.
  pub fn default_root() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".cache")))
      .ok_or_else(|| eyre!("Could not determine cache directory"))?;

    Ok(cache_dir.join("prtempo").join("requests"))
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn parent_dir(&self, key: &CacheKey) -> PathBuf {
    self.root.join(format!("pr_{}", key.parent_id))
  }

  fn entry_path(&self, key: &CacheKey) -> PathBuf {
    self.parent_dir(key).join(format!(
      "{}_{}.json",
      key.url_digest(),
      key.watermark_digest()
    ))
  }
}

impl CacheStorage for FileStorage {
  fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
    let path = self.entry_path(key);

    let bytes = match std::fs::read(&path) {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == ErrorKind::NotFound => {
        self.stats.record_miss();
        return Ok(None);
      }
      Err(e) => {
        self.stats.record_miss();
        return Err(eyre!("Failed to read cache entry {}: {}", path.display(), e));
      }
    };

    match serde_json::from_slice(&bytes) {
      Ok(payload) => {
        self.stats.record_hit();
        Ok(Some(payload))
      }
      Err(e) => {
        self.stats.record_miss();
        // A corrupt entry would otherwise block the rewrite in `put`.
        let _ = std::fs::remove_file(&path);
        Err(eyre!(
          "Failed to parse cache entry {}: {}",
          path.display(),
          e
        ))
      }
    }
  }

  fn put(&self, key: &CacheKey, payload: &Value) -> Result<()> {
    let path = self.entry_path(key);
    if path.exists() {
      return Ok(());
    }

    let dir = self.parent_dir(key);
    // create_dir_all tolerates another writer creating the same directory.
    std::fs::create_dir_all(&dir)
      .map_err(|e| eyre!("Failed to create cache directory {}: {}", dir.display(), e))?;

    let data =
      serde_json::to_vec(payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;

    // Write to a unique sibling, then rename, so readers never see partial files.
    let tmp = dir.join(format!(
      ".{}.{}.{}.tmp",
      key.url_digest(),
      std::process::id(),
      self.tmp_seq.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&tmp, &data)
      .map_err(|e| eyre!("Failed to write cache entry {}: {}", tmp.display(), e))?;

    if let Err(e) = std::fs::rename(&tmp, &path) {
      let _ = std::fs::remove_file(&tmp);
      return Err(eyre!(
        "Failed to move cache entry into place {}: {}",
        path.display(),
        e
      ));
    }

    self.stats.record_store();
    Ok(())
  }

  fn stats(&self) -> CacheStatsSnapshot {
    self.stats.snapshot()
  }

  fn clear(&self) -> Result<()> {
    match std::fs::remove_dir_all(&self.root) {
      Ok(()) => {}
      Err(e) if e.kind() == ErrorKind::NotFound => {}
      Err(e) => {
        return Err(eyre!(
          "Failed to clear cache at {}: {}",
          self.root.display(),
          e
        ))
      }
    }

    self.stats.reset();
    Ok(())
  }
}
