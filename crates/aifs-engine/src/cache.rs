//! Byte-bounded LRU cache of verified content.
//!
//! Shared by handle; the content store populates it after a successful
//! integrity check and evicts on delete.
//!
//! Fills race with deletes: a read that started before a delete may finish
//! after it. Every removal bumps an epoch, and a fill only lands if the epoch
//! it observed before reading is still current. Both happen under one lock.

use aifs_core::AssetId;
use bytes::Bytes;
use moka::{policy::EvictionPolicy, sync::Cache};
use parking_lot::Mutex;

pub struct BlobCache {
  max_bytes: u64,
  inner:     Cache<AssetId, Bytes>,
  epoch:     Mutex<u64>,
}

/// Point-in-time counters, reported through engine stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
  pub entries:   u64,
  pub bytes:     u64,
  pub max_bytes: u64,
}

impl BlobCache {
  pub fn new(max_bytes: usize) -> Self {
    let max_bytes = max_bytes as u64;
    let inner = Cache::builder()
      .max_capacity(max_bytes)
      .eviction_policy(EvictionPolicy::lru())
      // Weights are u32; larger blobs are never inserted, see `fill`.
      .weigher(|_id: &AssetId, data: &Bytes| u32::try_from(data.len()).unwrap_or(u32::MAX))
      .build();
    Self { max_bytes, inner, epoch: Mutex::new(0) }
  }

  pub fn get(&self, id: &AssetId) -> Option<Bytes> { self.inner.get(id) }

  /// Token to pass to [`fill`](Self::fill) once the read it guards is done.
  pub fn epoch(&self) -> u64 { *self.epoch.lock() }

  /// Insert `data` unless something was removed since `epoch` was taken.
  /// Returns whether the entry was inserted.
  pub fn fill(&self, id: AssetId, data: Bytes, epoch: u64) -> bool {
    let len = data.len() as u64;
    if len > self.max_bytes || len > u64::from(u32::MAX) {
      return false;
    }
    let current = self.epoch.lock();
    if *current != epoch {
      return false;
    }
    self.inner.insert(id, data);
    true
  }

  pub fn remove(&self, id: &AssetId) {
    let mut epoch = self.epoch.lock();
    *epoch += 1;
    self.inner.invalidate(id);
  }

  pub fn stats(&self) -> CacheStats {
    self.inner.run_pending_tasks();
    CacheStats {
      entries:   self.inner.entry_count(),
      bytes:     self.inner.weighted_size(),
      max_bytes: self.max_bytes,
    }
  }
}
