//! Core types for the request cache.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one cached sub-resource response.
///
/// The watermark is the parent record's own "last updated" marker, so an entry
/// is superseded (never overwritten) as soon as the parent changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub parent_id: u64,
  pub resource_url: String,
  pub watermark: String,
}

impl CacheKey {
  pub fn new(parent_id: u64, resource_url: impl Into<String>, watermark: impl Into<String>) -> Self {
    Self {
      parent_id,
      resource_url: resource_url.into(),
      watermark: watermark.into(),
    }
  }

  /// SHA256 of the resource URL, hex encoded.
  pub fn url_digest(&self) -> String {
    digest(&self.resource_url)
  }

  /// Shortened SHA256 of the watermark. Watermarks are timestamps and contain
  /// characters that are not portable in file names.
  pub fn watermark_digest(&self) -> String {
    let mut full = digest(&self.watermark);
    full.truncate(16);
    full
  }
}

fn digest(input: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  hex::encode(hasher.finalize())
}

/// Output of a fetch function run on a cache miss.
#[derive(Debug, Clone)]
pub struct Fetched {
  pub payload: Value,
  /// Whether the payload may be written to the cache. Results known to be
  /// incomplete because of an error are returned but not persisted.
  pub persist: bool,
}

impl Fetched {
  pub fn complete(payload: Value) -> Self {
    Self {
      payload,
      persist: true,
    }
  }

  pub fn transient(payload: Value) -> Self {
    Self {
      payload,
      persist: false,
    }
  }
}

/// Process-lifetime cache counters owned by a storage instance.
#[derive(Debug, Default)]
pub struct CacheStats {
  hits: AtomicU64,
  misses: AtomicU64,
  stores: AtomicU64,
}

impl CacheStats {
  pub fn record_hit(&self) {
    self.hits.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_miss(&self) {
    self.misses.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_store(&self) {
    self.stores.fetch_add(1, Ordering::Relaxed);
  }

  pub fn reset(&self) {
    self.hits.store(0, Ordering::Relaxed);
    self.misses.store(0, Ordering::Relaxed);
    self.stores.store(0, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> CacheStatsSnapshot {
    CacheStatsSnapshot {
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      stores: self.stores.load(Ordering::Relaxed),
    }
  }
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
  pub hits: u64,
  pub misses: u64,
  pub stores: u64,
}
