//! The `MetadataStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `aifs-store-sqlite`).
//! The engine depends on this abstraction, not on any concrete backend.
//! Content bytes and vectors are not part of it; those belong to the engine.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  asset::{Asset, AssetId, AssetKind},
  lineage::Relationship,
  snapshot::Snapshot,
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`MetadataStore::list_assets`]. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct AssetQuery {
  pub kind:   Option<AssetKind>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the persistent record store for assets, lineage edges,
/// and snapshots.
///
/// Tombstoned assets are invisible to every asset read. Snapshot records keep
/// listing their ids regardless.
///
/// All methods return `Send` futures so the trait can be used from a
/// multi-threaded tokio runtime.
pub trait MetadataStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Assets ────────────────────────────────────────────────────────────

  /// Persist a new asset record together with its incoming lineage edges,
  /// atomically.
  fn insert_asset(
    &self,
    asset: Asset,
    edges: Vec<Relationship>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Fetch a live asset with parents and children resolved. Returns `None`
  /// if absent or tombstoned.
  fn get_asset(
    &self,
    id: AssetId,
  ) -> impl Future<Output = Result<Option<Asset>, Self::Error>> + Send + '_;

  /// List live assets, newest first.
  fn list_assets(
    &self,
    query: AssetQuery,
  ) -> impl Future<Output = Result<Vec<Asset>, Self::Error>> + Send + '_;

  /// Number of live assets.
  fn count_assets(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// The subset of `ids` that are live, in input order.
  fn existing_assets(
    &self,
    ids: Vec<AssetId>,
  ) -> impl Future<Output = Result<Vec<AssetId>, Self::Error>> + Send + '_;

  /// Every live asset that carries an embedding. Used to rebuild the vector
  /// index.
  fn embedded_assets(
    &self,
  ) -> impl Future<Output = Result<Vec<Asset>, Self::Error>> + Send + '_;

  /// Delete an asset record and every edge touching it. Returns `false` if
  /// there was nothing to delete.
  fn remove_asset(
    &self,
    id: AssetId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Mark an asset deleted while keeping the record for snapshot history.
  fn tombstone_asset(
    &self,
    id: AssetId,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Lineage ───────────────────────────────────────────────────────────

  fn insert_relationship(
    &self,
    edge: Relationship,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Every stored edge, oldest first. Used to load the in-memory graph.
  fn list_relationships(
    &self,
  ) -> impl Future<Output = Result<Vec<Relationship>, Self::Error>> + Send + '_;

  // ── Snapshots ─────────────────────────────────────────────────────────

  /// Persist a snapshot and its asset list atomically.
  fn insert_snapshot(
    &self,
    snapshot: Snapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_snapshot(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Snapshot>, Self::Error>> + Send + '_;

  /// Snapshots, newest first, optionally restricted to a namespace.
  fn list_snapshots(
    &self,
    namespace: Option<String>,
  ) -> impl Future<Output = Result<Vec<Snapshot>, Self::Error>> + Send + '_;

  /// Snapshots whose asset list contains `id`.
  fn snapshots_referencing(
    &self,
    id: AssetId,
  ) -> impl Future<Output = Result<Vec<Snapshot>, Self::Error>> + Send + '_;
}
