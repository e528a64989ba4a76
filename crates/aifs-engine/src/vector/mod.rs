//! Nearest-neighbour search over asset embeddings.
//!
//! [`VectorIndex`] is implemented by two backends:
//!
//! - [`hnsw::HnswIndex`]: approximate HNSW graph via `usearch`, compiled in
//!   with the `usearch` cargo feature.
//! - [`flat::FlatIndex`]: exact brute-force cosine search, always available.
//!
//! The backend is chosen once, at open time, by [`open_index`]. Callers only
//! ever see `Arc<dyn VectorIndex>`.
//!
//! Scores are cosine similarities, highest first. Equal scores are ordered by
//! ascending asset id so results are reproducible across backends.

pub mod flat;
#[cfg(feature = "usearch")]
pub mod hnsw;

use std::{cmp::Ordering, collections::BTreeMap, fs, path::Path, sync::Arc};

use aifs_core::AssetId;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result, cas::write_atomic};

/// Filter fields stored with an entry; a search filter must match all of
/// its keys exactly.
pub type FilterFields = BTreeMap<String, String>;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const METRIC: &str = "cosine";

// ─── Policy & stats ──────────────────────────────────────────────────────────

/// Which backend to use at startup.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackendPolicy {
  /// Primary if available, otherwise the exact fallback.
  #[default]
  Auto,
  /// Primary or fail.
  Usearch,
  Flat,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
  Usearch,
  Flat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
  pub backend:   BackendKind,
  pub dimension: usize,
  pub count:     usize,
  pub metric:    String,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
  pub asset_id: AssetId,
  pub score:    f32,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Capability set shared by every backend. Implementations are internally
/// synchronised: writes take an exclusive lock, searches a shared one.
pub trait VectorIndex: Send + Sync {
  fn backend(&self) -> BackendKind;

  fn dimension(&self) -> usize;

  fn len(&self) -> usize;

  fn is_empty(&self) -> bool { self.len() == 0 }

  /// Insert or replace the entry for `id`.
  fn add_with_fields(&self, id: &AssetId, embedding: &[f32], fields: FilterFields) -> Result<()>;

  fn add(&self, id: &AssetId, embedding: &[f32]) -> Result<()> {
    self.add_with_fields(id, embedding, FilterFields::new())
  }

  /// Up to `k` hits, best first, no duplicate ids.
  fn search(
    &self,
    query: &[f32],
    k: usize,
    filter: Option<&FilterFields>,
  ) -> Result<Vec<VectorMatch>>;

  /// Returns whether an entry was removed. Absent ids are not an error.
  fn delete(&self, id: &AssetId) -> Result<bool>;

  /// Write the backend data file(s) into `dir`.
  fn save(&self, dir: &Path) -> Result<()>;

  fn stats(&self) -> IndexStats {
    IndexStats {
      backend:   self.backend(),
      dimension: self.dimension(),
      count:     self.len(),
      metric:    METRIC.to_owned(),
    }
  }
}

// ─── Shared helpers ──────────────────────────────────────────────────────────

/// Shape and value checks applied to every stored vector and query.
pub fn validate(embedding: &[f32], dimension: usize) -> Result<()> {
  if embedding.len() != dimension {
    return Err(Error::DimensionMismatch { expected: dimension, actual: embedding.len() });
  }
  if let Some(pos) = embedding.iter().position(|x| !x.is_finite()) {
    return Err(Error::InvalidEmbedding(format!("component {pos} is not finite")));
  }
  if embedding.iter().all(|x| *x == 0.0) {
    return Err(Error::InvalidEmbedding("zero vector has no direction".into()));
  }
  Ok(())
}

/// Unit-length copy of `v`. Callers validate first, so the norm is non-zero.
pub(crate) fn normalize(v: &[f32]) -> Vec<f32> {
  let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
  v.iter().map(|x| x / norm).collect()
}

pub(crate) fn matches_filter(fields: &FilterFields, filter: Option<&FilterFields>) -> bool {
  filter.is_none_or(|f| f.iter().all(|(k, v)| fields.get(k) == Some(v)))
}

/// Best first; ties by ascending id.
pub(crate) fn rank(mut hits: Vec<VectorMatch>, k: usize) -> Vec<VectorMatch> {
  hits.sort_by(|a, b| match b.score.total_cmp(&a.score) {
    Ordering::Equal => a.asset_id.cmp(&b.asset_id),
    other => other,
  });
  hits.truncate(k);
  hits
}

// ─── Persistence & selection ─────────────────────────────────────────────────

/// `vectors/manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorManifest {
  pub backend:   BackendKind,
  pub dimension: usize,
  pub count:     usize,
  pub metric:    String,
}

/// An opened index and whether it must be repopulated from stored
/// embeddings.
pub struct OpenedIndex {
  pub index:         Arc<dyn VectorIndex>,
  pub needs_rebuild: bool,
}

/// Whether the primary backend can be constructed in this build.
pub fn probe_primary() -> std::result::Result<(), String> {
  #[cfg(feature = "usearch")]
  {
    hnsw::probe()
  }
  #[cfg(not(feature = "usearch"))]
  {
    Err("built without the `usearch` feature".to_owned())
  }
}

/// Resolve `policy` to a concrete backend.
pub fn select_backend(policy: BackendPolicy) -> Result<BackendKind> {
  match policy {
    BackendPolicy::Flat => Ok(BackendKind::Flat),
    BackendPolicy::Usearch => probe_primary()
      .map(|()| BackendKind::Usearch)
      .map_err(|reason| Error::BackendUnavailable { backend: "usearch".into(), reason }),
    BackendPolicy::Auto => match probe_primary() {
      Ok(()) => Ok(BackendKind::Usearch),
      Err(reason) => {
        let degraded = Error::BackendUnavailable { backend: "usearch".into(), reason };
        tracing::warn!(error = %degraded, "falling back to exact flat vector index");
        Ok(BackendKind::Flat)
      }
    },
  }
}

/// A fresh, empty index of the given backend.
pub fn new_index(kind: BackendKind, dimension: usize) -> Result<Arc<dyn VectorIndex>> {
  match kind {
    BackendKind::Flat => Ok(Arc::new(flat::FlatIndex::new(dimension))),
    #[cfg(feature = "usearch")]
    BackendKind::Usearch => Ok(Arc::new(hnsw::HnswIndex::new(dimension)?)),
    #[cfg(not(feature = "usearch"))]
    BackendKind::Usearch => Err(Error::BackendUnavailable {
      backend: "usearch".into(),
      reason:  "built without the `usearch` feature".into(),
    }),
  }
}

fn load(kind: BackendKind, dir: &Path, dimension: usize) -> Result<Arc<dyn VectorIndex>> {
  match kind {
    BackendKind::Flat => Ok(Arc::new(flat::FlatIndex::load(dir, dimension)?)),
    #[cfg(feature = "usearch")]
    BackendKind::Usearch => Ok(Arc::new(hnsw::HnswIndex::load(dir, dimension)?)),
    #[cfg(not(feature = "usearch"))]
    BackendKind::Usearch => new_index(kind, dimension),
  }
}

/// Select a backend and restore its persisted state from `dir` when the
/// manifest matches. Anything else yields an empty index flagged for
/// rebuild.
pub fn open_index(dir: &Path, policy: BackendPolicy, dimension: usize) -> Result<OpenedIndex> {
  let kind = select_backend(policy)?;
  fs::create_dir_all(dir)?;

  let manifest = match fs::read(dir.join(MANIFEST_FILE)) {
    Ok(bytes) => serde_json::from_slice::<VectorManifest>(&bytes).ok(),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
    Err(e) => return Err(e.into()),
  };

  let reusable = manifest
    .as_ref()
    .is_some_and(|m| m.backend == kind && m.dimension == dimension && m.metric == METRIC);
  if reusable {
    match load(kind, dir, dimension) {
      Ok(index) if manifest.as_ref().is_some_and(|m| m.count == index.len()) => {
        tracing::info!(backend = %kind, dimension, count = index.len(), "vector index loaded");
        return Ok(OpenedIndex { index, needs_rebuild: false });
      }
      Ok(_) => tracing::warn!(backend = %kind, "vector index count disagrees with manifest"),
      Err(e) => tracing::warn!(backend = %kind, error = %e, "vector index data unreadable"),
    }
  } else if let Some(m) = &manifest {
    tracing::info!(
      persisted = %m.backend,
      persisted_dimension = m.dimension,
      active = %kind,
      dimension,
      "persisted vector index does not match active configuration"
    );
  }

  tracing::info!(backend = %kind, dimension, "vector index will be rebuilt");
  Ok(OpenedIndex { index: new_index(kind, dimension)?, needs_rebuild: true })
}

/// Persist `index` and its manifest into `dir`.
pub fn save_index(index: &dyn VectorIndex, dir: &Path) -> Result<()> {
  fs::create_dir_all(dir)?;
  index.save(dir)?;
  let stats = index.stats();
  let manifest = VectorManifest {
    backend:   stats.backend,
    dimension: stats.dimension,
    count:     stats.count,
    metric:    stats.metric,
  };
  write_atomic(&dir.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?)?;
  tracing::debug!(backend = %stats.backend, count = stats.count, "vector index saved");
  Ok(())
}
