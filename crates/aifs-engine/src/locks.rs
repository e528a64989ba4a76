//! Per-asset async mutexes.
//!
//! The table holds only weak references; a mutex lives as long as someone
//! holds or awaits it. Dead entries are pruned as the table grows.

use std::{
  collections::HashMap,
  sync::{Arc, Weak},
};

use aifs_core::AssetId;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const MIN_PRUNE_AT: usize = 64;

pub type AssetGuard = OwnedMutexGuard<()>;

pub struct KeyedLocks {
  inner: Mutex<Table>,
}

struct Table {
  slots:    HashMap<AssetId, Weak<AsyncMutex<()>>>,
  prune_at: usize,
}

impl Default for KeyedLocks {
  fn default() -> Self {
    Self { inner: Mutex::new(Table { slots: HashMap::new(), prune_at: MIN_PRUNE_AT }) }
  }
}

impl KeyedLocks {
  pub fn new() -> Self { Self::default() }

  fn slot(&self, id: &AssetId) -> Arc<AsyncMutex<()>> {
    let mut table = self.inner.lock();
    if let Some(live) = table.slots.get(id).and_then(Weak::upgrade) {
      return live;
    }
    let fresh = Arc::new(AsyncMutex::new(()));
    table.slots.insert(id.clone(), Arc::downgrade(&fresh));
    if table.slots.len() >= table.prune_at {
      table.slots.retain(|_, w| w.strong_count() > 0);
      table.prune_at = (table.slots.len() * 2).max(MIN_PRUNE_AT);
    }
    fresh
  }

  pub async fn lock(&self, id: &AssetId) -> AssetGuard { self.slot(id).lock_owned().await }

  /// Lock every id in ascending order. Duplicates are locked once.
  pub async fn lock_many(&self, ids: &[AssetId]) -> Vec<AssetGuard> {
    let mut sorted: Vec<&AssetId> = ids.iter().collect();
    sorted.sort();
    sorted.dedup();
    let mut guards = Vec::with_capacity(sorted.len());
    for id in sorted {
      guards.push(self.lock(id).await);
    }
    guards
  }

  /// Entries currently in the table, live or not yet pruned.
  pub fn len(&self) -> usize { self.inner.lock().slots.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}
