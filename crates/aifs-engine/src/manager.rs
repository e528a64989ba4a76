//! [`AssetManager`]: the single entry point over content, vectors, lineage,
//! records, and snapshots.
//!
//! Multi-step writes run in a fixed order (content, vector, lineage, record)
//! and undo completed steps in reverse when a later one fails. Writes to the
//! same asset id are serialised by a per-id lock; different ids proceed in
//! parallel.

use std::{fs, path::PathBuf, sync::Arc};

use aifs_core::{
  Asset, AssetId, HashAlgorithm, LineageDirection, Metadata, NewAsset, Relationship,
  RelationshipKind, Snapshot, Transform,
  store::{AssetQuery, MetadataStore},
};
use aifs_store_sqlite::SqliteStore;
use bytes::Bytes;
use chrono::{DateTime, SubsecRound as _, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  cache::{BlobCache, CacheStats},
  cas::{ContentStore, ContentStoreOptions},
  config::EngineConfig,
  crypto::{self, CryptoManager, MasterKey, PayloadCipher},
  deadline::Deadline,
  lineage::LineageGraph,
  locks::KeyedLocks,
  manifest::StoreManifest,
  merkle::{self, MerkleProof, MerkleTree},
  vector::{self, FilterFields, IndexStats, VectorIndex},
};

// ─── Results ─────────────────────────────────────────────────────────────────

/// A vector search hit joined with its asset record.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
  pub asset: Asset,
  pub score: f32,
}

/// One edge reached by [`AssetManager::get_lineage`].
#[derive(Debug, Clone, Serialize)]
pub struct LineageEntry {
  pub relationship: Relationship,
  /// Hops from the starting asset; direct parents or children are `1`.
  pub depth:        usize,
}

/// What [`AssetManager::delete_asset`] did with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteOutcome {
  /// Kept for an unexpired snapshot, invisible to reads.
  Tombstoned,
  /// Record and lineage edges removed.
  Removed,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
  pub asset_count:        u64,
  pub relationship_count: usize,
  pub vector:             IndexStats,
  pub hash_algorithm:     HashAlgorithm,
  pub encrypted:          bool,
  pub compressed:         bool,
  pub cache:              Option<CacheStats>,
  pub signer:             String,
}

/// A completed step of `put_asset`, undone in reverse on failure.
enum Applied {
  Content { newly_written: bool },
  Vector,
  Lineage(Vec<Uuid>),
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Opens an [`AssetManager`] from an [`EngineConfig`], optionally replacing
/// the signing key or the vector index.
pub struct AssetManagerBuilder {
  config:       EngineConfig,
  signing_key:  Option<SigningKey>,
  vector_index: Option<Arc<dyn VectorIndex>>,
}

impl AssetManagerBuilder {
  pub fn signing_key(mut self, key: SigningKey) -> Self {
    self.signing_key = Some(key);
    self
  }

  /// Use `index` instead of the configured backend. It is populated from the
  /// metadata store if empty.
  pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
    self.vector_index = Some(index);
    self
  }

  /// Open with the SQLite metadata store at `<root>/metadata.db`.
  pub async fn open(self) -> Result<AssetManager<SqliteStore>> {
    self.config.validate()?;
    fs::create_dir_all(&self.config.storage_root)?;
    let store = SqliteStore::open(self.config.metadata_path()).await.map_err(Error::metadata)?;
    self.with_store(store).await
  }

  pub async fn with_store<S: MetadataStore>(self, store: S) -> Result<AssetManager<S>> {
    let config = self.config;
    config.validate()?;
    let root = config.storage_root.clone();
    let manifest = StoreManifest::load_or_create(&root, config.hash_algorithm)?;

    let signing = match self.signing_key {
      Some(key) => key,
      None => crypto::load_signing_key(&config.signing_key_path())?,
    };
    let crypto = CryptoManager::new(signing, payload_cipher(&config, &manifest)?);

    let cache =
      (config.cache.max_bytes > 0).then(|| Arc::new(BlobCache::new(config.cache.max_bytes)));
    let content = ContentStore::open(&root, ContentStoreOptions {
      algorithm:   config.hash_algorithm,
      shard_depth: config.shard_depth,
      compression: config.compression.enabled.then_some(config.compression.level),
      cipher:      crypto.payload_cipher(),
      cache:       cache.clone(),
    })?;

    let embedded = store.embedded_assets().await.map_err(Error::metadata)?;
    let vectors_dir = config.vectors_dir();
    let (vectors, needs_rebuild) = match self.vector_index {
      Some(index) => {
        let empty = index.is_empty();
        (index, empty)
      }
      None => {
        let opened =
          vector::open_index(&vectors_dir, config.vector.backend, config.vector.dimension)?;
        if !opened.needs_rebuild && opened.index.len() != embedded.len() {
          // Writes after the last flush are missing from the persisted index.
          tracing::warn!(
            persisted = opened.index.len(),
            stored = embedded.len(),
            "persisted vector index is stale"
          );
          (vector::new_index(opened.index.backend(), config.vector.dimension)?, true)
        } else {
          (opened.index, opened.needs_rebuild)
        }
      }
    };

    let edges = store.list_relationships().await.map_err(Error::metadata)?;
    let lineage = LineageGraph::from_edges(edges);

    let manager = AssetManager {
      store,
      content,
      vectors,
      lineage,
      crypto,
      locks: KeyedLocks::new(),
      cache,
      vectors_dir,
    };
    if needs_rebuild {
      manager.rebuild_vectors(&embedded)?;
    }

    tracing::info!(
      root = %root.display(),
      backend = %manager.vectors.backend(),
      encrypted = manager.content.is_encrypted(),
      compressed = manager.content.is_compressed(),
      signer = %manager.crypto.public_key_hex(),
      "asset manager ready"
    );
    Ok(manager)
  }
}

/// The first field in which a re-put of stored content disagrees with the
/// stored record. Stored parents may be a superset: edges can be added later.
fn reput_conflict(existing: &Asset, new: &NewAsset) -> Option<&'static str> {
  if existing.kind != new.kind {
    Some("kind")
  } else if existing.metadata != new.metadata {
    Some("metadata")
  } else if existing.embedding != new.embedding {
    Some("embedding")
  } else if new.parents.iter().any(|p| !existing.parents.contains(p)) {
    Some("parent list")
  } else {
    None
  }
}

fn payload_cipher(
  config: &EngineConfig,
  manifest: &StoreManifest,
) -> Result<Option<PayloadCipher>> {
  let enc = &config.encryption;
  if !enc.enabled {
    return Ok(None);
  }
  let master = match (&enc.key_hex, &enc.passphrase) {
    (Some(key_hex), _) => MasterKey::from_hex(key_hex)?,
    (None, Some(passphrase)) => MasterKey::from_passphrase(passphrase, &manifest.salt_bytes()?)?,
    (None, None) => {
      return Err(Error::Configuration(
        "encryption.enabled requires encryption.key_hex or encryption.passphrase".into(),
      ));
    }
  };
  Ok(Some(PayloadCipher::new(&master)))
}

// ─── Manager ─────────────────────────────────────────────────────────────────

pub struct AssetManager<S> {
  store:       S,
  content:     ContentStore,
  vectors:     Arc<dyn VectorIndex>,
  lineage:     LineageGraph,
  crypto:      CryptoManager,
  locks:       KeyedLocks,
  cache:       Option<Arc<BlobCache>>,
  vectors_dir: PathBuf,
}

impl AssetManager<SqliteStore> {
  pub fn builder(config: EngineConfig) -> AssetManagerBuilder {
    AssetManagerBuilder { config, signing_key: None, vector_index: None }
  }

  /// Open the engine described by `config` with a SQLite metadata store.
  pub async fn open(config: EngineConfig) -> Result<Self> { Self::builder(config).open().await }
}

impl<S: MetadataStore> AssetManager<S> {
  pub fn public_key(&self) -> VerifyingKey { self.crypto.public_key() }

  pub fn hash_algorithm(&self) -> HashAlgorithm { self.content.algorithm() }

  fn rebuild_vectors(&self, assets: &[Asset]) -> Result<()> {
    let mut added = 0usize;
    for asset in assets {
      let Some(embedding) = &asset.embedding else { continue };
      match self.vectors.add_with_fields(&asset.asset_id, embedding, asset.filter_fields()) {
        Ok(()) => added += 1,
        Err(e @ (Error::DimensionMismatch { .. } | Error::InvalidEmbedding(_))) => {
          tracing::warn!(asset_id = %asset.asset_id, error = %e, "skipping stored embedding");
        }
        Err(e) => return Err(e),
      }
    }
    tracing::info!(count = added, backend = %self.vectors.backend(), "vector index rebuilt");
    Ok(())
  }

  async fn missing(&self, ids: &[AssetId]) -> Result<Vec<AssetId>> {
    let present = self.store.existing_assets(ids.to_vec()).await.map_err(Error::metadata)?;
    let mut missing: Vec<AssetId> = Vec::new();
    for id in ids {
      if !present.contains(id) && !missing.contains(id) {
        missing.push(id.clone());
      }
    }
    Ok(missing)
  }

  async fn record(&self, id: &AssetId) -> Result<Asset> {
    self
      .store
      .get_asset(id.clone())
      .await
      .map_err(Error::metadata)?
      .ok_or_else(|| Error::NotFound(format!("asset {id}")))
  }

  // ── Put ───────────────────────────────────────────────────────────────

  /// Store an asset. Re-putting existing content returns the existing record
  /// when the request matches it, and fails with `InvalidInput` when the kind,
  /// metadata, or embedding differ or a requested parent link is not recorded.
  pub async fn put_asset(&self, new: NewAsset) -> Result<Asset> {
    self.put_asset_with_deadline(new, Deadline::none()).await
  }

  pub async fn put_asset_with_deadline(&self, new: NewAsset, deadline: Deadline) -> Result<Asset> {
    const OP: &str = "put_asset";
    deadline.check(OP)?;

    if let Some(embedding) = &new.embedding {
      vector::validate(embedding, self.vectors.dimension())?;
    }
    let id = self.content.algorithm().content_id(&new.data);
    let parent_ids: Vec<AssetId> = new.parents.iter().map(|p| p.asset_id.clone()).collect();
    // Parents stay locked until the edges are persisted, so none can be
    // deleted in between.
    let mut lock_ids = parent_ids.clone();
    lock_ids.push(id.clone());
    let _guards = self.locks.lock_many(&lock_ids).await;

    if let Some(existing) = self.store.get_asset(id.clone()).await.map_err(Error::metadata)? {
      if let Some(field) = reput_conflict(&existing, &new) {
        return Err(Error::InvalidInput(format!(
          "asset {id} already exists with a different {field}"
        )));
      }
      tracing::debug!(asset_id = %id, "content already stored");
      return Ok(existing);
    }

    let missing = self.missing(&parent_ids).await?;
    if !missing.is_empty() {
      return Err(Error::AssetNotFound { missing });
    }
    if let Some(p) = parent_ids.iter().find(|p| self.lineage.would_cycle(p, &id)) {
      return Err(Error::CycleDetected { parent: p.clone(), child: id });
    }

    let edges: Vec<Relationship> = new
      .parents
      .iter()
      .map(|p| Relationship::new(p.asset_id.clone(), id.clone(), p.kind, p.transform.clone()))
      .collect();
    let asset = Asset {
      asset_id:       id.clone(),
      kind:           new.kind,
      size:           new.data.len() as u64,
      hash_algorithm: self.content.algorithm(),
      embedding:      new.embedding,
      metadata:       new.metadata,
      created_at:     Utc::now().trunc_subsecs(6),
      parents:        new.parents,
      children:       Vec::new(),
    };

    let mut applied = Vec::with_capacity(3);
    match self.apply_put(&asset, new.data, &edges, deadline, &mut applied).await {
      Ok(()) => {
        tracing::debug!(asset_id = %id, size = asset.size, kind = %asset.kind, "asset stored");
        Ok(asset)
      }
      Err(e) if applied.is_empty() => Err(e),
      Err(e) => {
        tracing::warn!(asset_id = %id, error = %e, "put_asset failed, rolling back");
        self.roll_back_put(&id, applied).await;
        Err(match e {
          Error::Timeout { .. } => e,
          e => Error::TransactionFailed { operation: OP, source: Box::new(e) },
        })
      }
    }
  }

  async fn apply_put(
    &self,
    asset: &Asset,
    data: Bytes,
    edges: &[Relationship],
    deadline: Deadline,
    applied: &mut Vec<Applied>,
  ) -> Result<()> {
    const OP: &str = "put_asset";
    let id = &asset.asset_id;
    deadline.check(OP)?;

    let outcome = self.content.put(data).await?;
    applied.push(Applied::Content { newly_written: outcome.newly_written });
    if &outcome.id != id {
      return Err(Error::integrity(id.as_str(), format!("content store returned {}", outcome.id)));
    }
    deadline.check(OP)?;

    if let Some(embedding) = &asset.embedding {
      self.vectors.add_with_fields(id, embedding, asset.filter_fields())?;
      applied.push(Applied::Vector);
    }
    deadline.check(OP)?;

    if !edges.is_empty() {
      self.lineage.add_relationships(edges)?;
      applied.push(Applied::Lineage(edges.iter().map(|e| e.relationship_id).collect()));
    }
    deadline.check(OP)?;

    self
      .store
      .insert_asset(asset.clone(), edges.to_vec())
      .await
      .map_err(Error::metadata)
  }

  async fn roll_back_put(&self, id: &AssetId, applied: Vec<Applied>) {
    for step in applied.into_iter().rev() {
      match step {
        Applied::Lineage(edges) => {
          for rid in edges {
            self.lineage.remove_relationship(rid);
          }
        }
        Applied::Vector => {
          if let Err(e) = self.vectors.delete(id) {
            tracing::error!(asset_id = %id, error = %e, "rollback: vector delete failed");
          }
        }
        Applied::Content { newly_written: true } => {
          if let Err(e) = self.content.delete(id).await {
            tracing::error!(asset_id = %id, error = %e, "rollback: content delete failed");
          }
        }
        Applied::Content { newly_written: false } => {}
      }
    }
  }

  // ── Read ──────────────────────────────────────────────────────────────

  pub async fn get_asset(&self, id: &AssetId) -> Result<(Asset, Bytes)> {
    let asset = self.record(id).await?;
    let data = self.content.get(id).await?;
    Ok((asset, data))
  }

  /// The record without its content.
  pub async fn get_asset_record(&self, id: &AssetId) -> Result<Asset> { self.record(id).await }

  pub async fn list_assets(&self, query: AssetQuery) -> Result<Vec<Asset>> {
    self.store.list_assets(query).await.map_err(Error::metadata)
  }

  /// Nearest neighbours of `query`, joined with their records. Hits whose
  /// record is gone are dropped.
  pub async fn vector_search(
    &self,
    query: &[f32],
    k: usize,
    filter: Option<&FilterFields>,
  ) -> Result<Vec<SearchHit>> {
    let matches = self.vectors.search(query, k, filter)?;
    let mut hits = Vec::with_capacity(matches.len());
    for m in matches {
      match self.store.get_asset(m.asset_id.clone()).await.map_err(Error::metadata)? {
        Some(asset) => hits.push(SearchHit { asset, score: m.score }),
        None => tracing::debug!(asset_id = %m.asset_id, "dropping search hit without a record"),
      }
    }
    Ok(hits)
  }

  // ── Snapshots ─────────────────────────────────────────────────────────

  pub async fn create_snapshot(
    &self,
    namespace: &str,
    ids: &[AssetId],
    metadata: Option<Metadata>,
    expires_at: Option<DateTime<Utc>>,
  ) -> Result<Snapshot> {
    self
      .create_snapshot_with_deadline(namespace, ids, metadata, expires_at, Deadline::none())
      .await
  }

  /// Sign a Merkle root over `ids` (first occurrence of each id, in order).
  /// Nothing is persisted unless every id exists.
  pub async fn create_snapshot_with_deadline(
    &self,
    namespace: &str,
    ids: &[AssetId],
    metadata: Option<Metadata>,
    expires_at: Option<DateTime<Utc>>,
    deadline: Deadline,
  ) -> Result<Snapshot> {
    const OP: &str = "create_snapshot";
    if namespace.trim().is_empty() {
      return Err(Error::InvalidInput("snapshot namespace must not be empty".into()));
    }
    deadline.check(OP)?;

    let mut asset_ids: Vec<AssetId> = Vec::with_capacity(ids.len());
    for id in ids {
      if !asset_ids.contains(id) {
        asset_ids.push(id.clone());
      }
    }

    let _guards = self.locks.lock_many(&asset_ids).await;
    deadline.check(OP)?;

    let missing = self.missing(&asset_ids).await?;
    if !missing.is_empty() {
      return Err(Error::AssetNotFound { missing });
    }

    let tree = MerkleTree::build(&asset_ids);
    let root = tree.root();
    let created_at = Utc::now().trunc_subsecs(6);
    let signature = self.crypto.sign(&root, created_at, namespace);

    let snapshot = Snapshot {
      snapshot_id: Uuid::new_v4(),
      namespace: namespace.to_owned(),
      asset_ids,
      merkle_root: hex::encode(root),
      signature: hex::encode(signature.to_bytes()),
      signer: self.crypto.public_key_hex(),
      created_at,
      expires_at,
      metadata: metadata.unwrap_or_default(),
    };
    deadline.check(OP)?;

    self.store.insert_snapshot(snapshot.clone()).await.map_err(Error::metadata)?;
    tracing::info!(
      snapshot_id = %snapshot.snapshot_id,
      namespace,
      assets = snapshot.asset_ids.len(),
      root = %snapshot.merkle_root,
      "snapshot created"
    );
    Ok(snapshot)
  }

  pub async fn get_snapshot(&self, snapshot_id: Uuid) -> Result<Snapshot> {
    self
      .store
      .get_snapshot(snapshot_id)
      .await
      .map_err(Error::metadata)?
      .ok_or_else(|| Error::NotFound(format!("snapshot {snapshot_id}")))
  }

  pub async fn list_snapshots(&self, namespace: Option<&str>) -> Result<Vec<Snapshot>> {
    self
      .store
      .list_snapshots(namespace.map(str::to_owned))
      .await
      .map_err(Error::metadata)
  }

  /// Check the signature against `public_key`, then rebuild the root from
  /// the assets that still exist and pass an integrity check.
  pub async fn verify_snapshot(
    &self,
    snapshot_id: Uuid,
    public_key: &VerifyingKey,
  ) -> Result<bool> {
    let snapshot = self.get_snapshot(snapshot_id).await?;
    let invalid = || Error::SignatureInvalid { snapshot_id };

    let recorded = merkle::parse_root(&snapshot.merkle_root).map_err(|_| invalid())?;
    let signature = crypto::parse_signature(&snapshot.signature).map_err(|_| invalid())?;
    let signed_at = snapshot.created_at;
    if !crypto::verify(&signature, &recorded, signed_at, &snapshot.namespace, public_key) {
      tracing::warn!(%snapshot_id, "snapshot signature does not verify");
      return Err(invalid());
    }

    let present = self
      .store
      .existing_assets(snapshot.asset_ids.clone())
      .await
      .map_err(Error::metadata)?;
    let mut intact = Vec::with_capacity(snapshot.asset_ids.len());
    let mut missing = Vec::new();
    for id in &snapshot.asset_ids {
      let ok = present.contains(id)
        && match self.content.verify(id).await {
          Ok(ok) => ok,
          Err(Error::NotFound(_)) => false,
          Err(e) => return Err(e),
        };
      if ok {
        intact.push(id.clone());
      } else {
        missing.push(id.clone());
      }
    }

    let actual = MerkleTree::build(&intact).root();
    if actual != recorded {
      tracing::warn!(%snapshot_id, missing = missing.len(), "snapshot root mismatch");
      return Err(Error::RootMismatch {
        snapshot_id,
        expected: snapshot.merkle_root,
        actual: hex::encode(actual),
        missing,
      });
    }
    tracing::debug!(%snapshot_id, "snapshot verified");
    Ok(true)
  }

  /// Inclusion proof for `asset_id` against the snapshot's recorded root.
  pub async fn snapshot_proof(&self, snapshot_id: Uuid, asset_id: &AssetId) -> Result<MerkleProof> {
    let snapshot = self.get_snapshot(snapshot_id).await?;
    MerkleTree::build(&snapshot.asset_ids).proof(asset_id)
  }

  // ── Delete ────────────────────────────────────────────────────────────

  /// Remove the vector entry and content. The record is tombstoned while an
  /// unexpired snapshot references it and removed with its edges otherwise.
  ///
  /// The record changes first; if that fails, nothing else is touched.
  pub async fn delete_asset(&self, id: &AssetId) -> Result<DeleteOutcome> {
    const OP: &str = "delete_asset";
    let _guard = self.locks.lock(id).await;
    self.record(id).await?;

    let now = Utc::now();
    let protected = self
      .store
      .snapshots_referencing(id.clone())
      .await
      .map_err(Error::metadata)?
      .iter()
      .any(|s| !s.is_expired(now));

    let outcome = if protected {
      self.store.tombstone_asset(id.clone(), now).await.map_err(Error::metadata)?;
      DeleteOutcome::Tombstoned
    } else {
      self.store.remove_asset(id.clone()).await.map_err(Error::metadata)?;
      self.lineage.remove_asset(id);
      DeleteOutcome::Removed
    };

    let retracted = match self.vectors.delete(id) {
      Ok(_) => match self.content.delete(id).await {
        Err(Error::NotFound(_)) => {
          tracing::warn!(asset_id = %id, "content already absent");
          Ok(())
        }
        other => other,
      },
      Err(e) => Err(e),
    };
    if let Err(e) = retracted {
      tracing::error!(asset_id = %id, ?outcome, error = %e, "record deleted, data not retracted");
      return Err(Error::TransactionFailed { operation: OP, source: Box::new(e) });
    }

    tracing::info!(asset_id = %id, ?outcome, "asset deleted");
    Ok(outcome)
  }

  // ── Lineage ───────────────────────────────────────────────────────────

  pub async fn add_relationship(
    &self,
    parent: &AssetId,
    child: &AssetId,
    transform: Transform,
  ) -> Result<Relationship> {
    self.add_relationship_of_kind(parent, child, RelationshipKind::default(), transform).await
  }

  pub async fn add_relationship_of_kind(
    &self,
    parent: &AssetId,
    child: &AssetId,
    kind: RelationshipKind,
    transform: Transform,
  ) -> Result<Relationship> {
    let pair = [parent.clone(), child.clone()];
    let _guards = self.locks.lock_many(&pair).await;
    let missing = self.missing(&pair).await?;
    if !missing.is_empty() {
      return Err(Error::AssetNotFound { missing });
    }

    let edge = Relationship::new(parent.clone(), child.clone(), kind, transform);
    self.lineage.add_relationship(edge.clone())?;
    if let Err(e) = self.store.insert_relationship(edge.clone()).await {
      self.lineage.remove_relationship(edge.relationship_id);
      return Err(Error::TransactionFailed {
        operation: "add_relationship",
        source:    Box::new(Error::metadata(e)),
      });
    }
    tracing::debug!(%parent, %child, relationship_id = %edge.relationship_id, "relationship added");
    Ok(edge)
  }

  /// Edges reachable from `id` within `depth` hops, nearest first.
  pub async fn get_lineage(
    &self,
    id: &AssetId,
    direction: LineageDirection,
    depth: usize,
  ) -> Result<Vec<LineageEntry>> {
    self.record(id).await?;
    let arena = self.lineage.read();
    Ok(
      arena
        .walk(id, direction, depth)
        .map(|step| LineageEntry { relationship: step.edge.clone(), depth: step.depth })
        .collect(),
    )
  }

  // ── Maintenance ───────────────────────────────────────────────────────

  pub async fn stats(&self) -> Result<EngineStats> {
    Ok(EngineStats {
      asset_count:        self.store.count_assets().await.map_err(Error::metadata)?,
      relationship_count: self.lineage.edge_count(),
      vector:             self.vectors.stats(),
      hash_algorithm:     self.content.algorithm(),
      encrypted:          self.content.is_encrypted(),
      compressed:         self.content.is_compressed(),
      cache:              self.cache.as_ref().map(|c| c.stats()),
      signer:             self.crypto.public_key_hex(),
    })
  }

  /// Persist the vector index so the next open can skip the rebuild.
  pub async fn flush(&self) -> Result<()> {
    let index = self.vectors.clone();
    let dir = self.vectors_dir.clone();
    tokio::task::spawn_blocking(move || vector::save_index(index.as_ref(), &dir))
      .await
      .map_err(|e| Error::Io(std::io::Error::other(e)))?
  }
}
