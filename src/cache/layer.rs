//! Cache layer that orchestrates caching logic with network fetching.

use color_eyre::Result;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::storage::CacheStorage;
use super::traits::{CacheKey, CacheStatsSnapshot, Fetched};

/// Cache layer that manages caching logic and network fetching.
///
/// Entries are addressed by the parent's watermark, so there is no staleness
/// check: an entry is either for the current version of its parent or it is
/// never asked for again.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Fetch a sub-resource with cache-first strategy.
  ///
  /// 1. Check cache - on a hit, return the payload without calling `fetcher`
  /// 2. On a miss (or unreadable entry), call `fetcher` with the resource URL
  /// 3. Store the result if it is complete; a failed write is only logged
  pub async fn fetch_sub_resource<F, Fut>(&self, key: &CacheKey, fetcher: F) -> Result<Value>
  where
    F: FnOnce(&str) -> Fut,
    Fut: Future<Output = Result<Fetched>>,
  {
    match self.storage.get(key) {
      Ok(Some(payload)) => {
        debug!(
          parent = key.parent_id,
          url = %key.resource_url,
          watermark = %key.watermark,
          "Cache hit"
        );
        return Ok(payload);
      }
      Ok(None) => {}
      Err(e) => warn!(parent = key.parent_id, "Ignoring unreadable cache entry: {}", e),
    }

    info!(parent = key.parent_id, url = %key.resource_url, "Fetching from API");
    let fetched = fetcher(&key.resource_url).await?;

    if fetched.persist {
      if let Err(e) = self.storage.put(key, &fetched.payload) {
        warn!(parent = key.parent_id, "Failed to store cache entry: {}", e);
      }
    } else {
      warn!(
        parent = key.parent_id,
        url = %key.resource_url,
        "Result is incomplete, not caching"
      );
    }

    Ok(fetched.payload)
  }

  pub fn stats(&self) -> CacheStatsSnapshot {
    self.storage.stats()
  }

  pub fn clear(&self) -> Result<()> {
    self.storage.clear()
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}
