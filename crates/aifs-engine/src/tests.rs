//! End-to-end tests for `AssetManager` over a temporary storage root.

use std::{
  collections::HashSet,
  fs,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use aifs_core::{
  Asset, AssetId, HashAlgorithm, LineageDirection, NewAsset, ParentLink, Relationship, Snapshot,
  Transform,
  store::{AssetQuery, MetadataStore},
};
use aifs_store_sqlite::SqliteStore;
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use tempfile::TempDir;
use uuid::Uuid;

use crate::{
  AssetManager, DeleteOutcome, Deadline, EngineConfig, Error, ErrorKind, Result,
  cas::{ContentStore, ContentStoreOptions},
  merkle::{self, verify_proof},
  vector::{
    BackendKind, BackendPolicy, FilterFields, IndexStats, VectorIndex, VectorMatch,
    flat::FlatIndex,
  },
};

const DIM: usize = 4;

fn config(dir: &TempDir) -> EngineConfig {
  let mut config = EngineConfig::for_root(dir.path());
  config.vector.dimension = DIM;
  config.vector.backend = BackendPolicy::Flat;
  config
}

fn signing_key() -> SigningKey { SigningKey::from_bytes(&[7u8; 32]) }

async fn open(config: EngineConfig) -> AssetManager<SqliteStore> {
  AssetManager::builder(config)
    .signing_key(signing_key())
    .open()
    .await
    .expect("engine opens")
}

async fn open_with_index(
  config: EngineConfig,
  index: Arc<dyn VectorIndex>,
) -> AssetManager<SqliteStore> {
  AssetManager::builder(config)
    .signing_key(signing_key())
    .vector_index(index)
    .open()
    .await
    .expect("engine opens")
}

fn object_path(config: &EngineConfig, id: &AssetId) -> PathBuf {
  ContentStore::open(&config.storage_root, ContentStoreOptions {
    shard_depth: config.shard_depth,
    ..ContentStoreOptions::default()
  })
  .unwrap()
  .object_path(id)
}

fn count_objects(root: &Path) -> usize {
  fn walk(dir: &Path) -> usize {
    fs::read_dir(dir)
      .map(|entries| {
        entries
          .flatten()
          .map(|e| if e.path().is_dir() { walk(&e.path()) } else { 1 })
          .sum()
      })
      .unwrap_or(0)
  }
  walk(&root.join("objects"))
}

fn blob(data: &str) -> NewAsset { NewAsset::new(data.as_bytes().to_vec(), "blob") }

// ─── Test doubles ────────────────────────────────────────────────────────────

/// Accepts the dimension check, then fails every insert.
struct FailingIndex;

impl VectorIndex for FailingIndex {
  fn backend(&self) -> BackendKind { BackendKind::Flat }

  fn dimension(&self) -> usize { DIM }

  fn len(&self) -> usize { 0 }

  fn add_with_fields(&self, _: &AssetId, _: &[f32], _: FilterFields) -> Result<()> {
    Err(Error::Io(std::io::Error::other("index volume full")))
  }

  fn search(&self, _: &[f32], _: usize, _: Option<&FilterFields>) -> Result<Vec<VectorMatch>> {
    Ok(Vec::new())
  }

  fn delete(&self, _: &AssetId) -> Result<bool> { Ok(false) }

  fn save(&self, _: &Path) -> Result<()> { Ok(()) }
}

/// A flat index whose inserts take a while.
struct SlowIndex(FlatIndex);

impl VectorIndex for SlowIndex {
  fn backend(&self) -> BackendKind { BackendKind::Flat }

  fn dimension(&self) -> usize { self.0.dimension() }

  fn len(&self) -> usize { self.0.len() }

  fn add_with_fields(&self, id: &AssetId, v: &[f32], fields: FilterFields) -> Result<()> {
    std::thread::sleep(Duration::from_millis(50));
    self.0.add_with_fields(id, v, fields)
  }

  fn search(&self, q: &[f32], k: usize, f: Option<&FilterFields>) -> Result<Vec<VectorMatch>> {
    self.0.search(q, k, f)
  }

  fn delete(&self, id: &AssetId) -> Result<bool> { self.0.delete(id) }

  fn save(&self, dir: &Path) -> Result<()> { self.0.save(dir) }

  fn stats(&self) -> IndexStats { self.0.stats() }
}

/// SQLite underneath, but record deletion always fails.
struct FailingDeletes(SqliteStore);

fn store_err(e: aifs_store_sqlite::Error) -> std::io::Error { std::io::Error::other(e) }

impl MetadataStore for FailingDeletes {
  type Error = std::io::Error;

  fn insert_asset(
    &self,
    asset: Asset,
    edges: Vec<Relationship>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
    async move { self.0.insert_asset(asset, edges).await.map_err(store_err) }
  }

  fn get_asset(
    &self,
    id: AssetId,
  ) -> impl Future<Output = Result<Option<Asset>, Self::Error>> + Send + '_ {
    async move { self.0.get_asset(id).await.map_err(store_err) }
  }

  fn list_assets(
    &self,
    query: AssetQuery,
  ) -> impl Future<Output = Result<Vec<Asset>, Self::Error>> + Send + '_ {
    async move { self.0.list_assets(query).await.map_err(store_err) }
  }

  fn count_assets(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_ {
    async move { self.0.count_assets().await.map_err(store_err) }
  }

  fn existing_assets(
    &self,
    ids: Vec<AssetId>,
  ) -> impl Future<Output = Result<Vec<AssetId>, Self::Error>> + Send + '_ {
    async move { self.0.existing_assets(ids).await.map_err(store_err) }
  }

  fn embedded_assets(&self) -> impl Future<Output = Result<Vec<Asset>, Self::Error>> + Send + '_ {
    async move { self.0.embedded_assets().await.map_err(store_err) }
  }

  fn remove_asset(
    &self,
    _id: AssetId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_ {
    async move { Err(std::io::Error::other("database is locked")) }
  }

  fn tombstone_asset(
    &self,
    _id: AssetId,
    _at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_ {
    async move { Err(std::io::Error::other("database is locked")) }
  }

  fn insert_relationship(
    &self,
    edge: Relationship,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
    async move { self.0.insert_relationship(edge).await.map_err(store_err) }
  }

  fn list_relationships(
    &self,
  ) -> impl Future<Output = Result<Vec<Relationship>, Self::Error>> + Send + '_ {
    async move { self.0.list_relationships().await.map_err(store_err) }
  }

  fn insert_snapshot(
    &self,
    snapshot: Snapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
    async move { self.0.insert_snapshot(snapshot).await.map_err(store_err) }
  }

  fn get_snapshot(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Snapshot>, Self::Error>> + Send + '_ {
    async move { self.0.get_snapshot(id).await.map_err(store_err) }
  }

  fn list_snapshots(
    &self,
    namespace: Option<String>,
  ) -> impl Future<Output = Result<Vec<Snapshot>, Self::Error>> + Send + '_ {
    async move { self.0.list_snapshots(namespace).await.map_err(store_err) }
  }

  fn snapshots_referencing(
    &self,
    id: AssetId,
  ) -> impl Future<Output = Result<Vec<Snapshot>, Self::Error>> + Send + '_ {
    async move { self.0.snapshots_referencing(id).await.map_err(store_err) }
  }
}

// ─── Put / get ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_get_roundtrip_and_dedup() {
  let dir = TempDir::new().unwrap();
  let engine = open(config(&dir)).await;

  let first = engine.put_asset(blob("hello")).await.unwrap();
  let second = engine.put_asset(blob("hello")).await.unwrap();
  assert_eq!(
    first.asset_id.as_str(),
    "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
  );
  assert_eq!(first, second);
  assert_eq!(count_objects(dir.path()), 1);

  let err = engine
    .put_asset(blob("hello").with_metadata("lang", "en".into()))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);
  assert!(engine.get_asset_record(&first.asset_id).await.unwrap().metadata.is_empty());

  let (asset, data) = engine.get_asset(&first.asset_id).await.unwrap();
  assert_eq!(&data[..], b"hello");
  assert_eq!(asset.size, 5);
  assert_eq!(asset.hash_algorithm, HashAlgorithm::Sha256);
}

#[tokio::test]
async fn missing_asset_is_not_found() {
  let dir = TempDir::new().unwrap();
  let engine = open(config(&dir)).await;
  let id = HashAlgorithm::Sha256.content_id(b"never stored");
  assert_eq!(engine.get_asset(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
  assert_eq!(engine.get_asset_record(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn wrong_embedding_shape_rejected_before_any_write() {
  let dir = TempDir::new().unwrap();
  let engine = open(config(&dir)).await;
  let err = engine.put_asset(blob("x").with_embedding(vec![1.0; DIM + 1])).await.unwrap_err();
  assert!(matches!(err, Error::DimensionMismatch { expected: DIM, actual: 5 }));
  assert_eq!(count_objects(dir.path()), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_puts() {
  let dir = TempDir::new().unwrap();
  let engine = Arc::new(open(config(&dir)).await);

  let tasks: Vec<_> = (0..100)
    .map(|i| {
      let engine = engine.clone();
      tokio::spawn(async move { engine.put_asset(blob(&format!("asset {i}"))).await })
    })
    .collect();
  let mut ids = HashSet::new();
  for t in tasks {
    ids.insert(t.await.unwrap().unwrap().asset_id);
  }

  assert_eq!(ids.len(), 100);
  assert_eq!(engine.stats().await.unwrap().asset_count, 100);
  assert_eq!(count_objects(dir.path()), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_puts() {
  let dir = TempDir::new().unwrap();
  let engine = Arc::new(open(config(&dir)).await);

  let tasks: Vec<_> = (0..50)
    .map(|_| {
      let engine = engine.clone();
      tokio::spawn(async move { engine.put_asset(blob("same bytes")).await })
    })
    .collect();
  let mut ids = HashSet::new();
  for t in tasks {
    ids.insert(t.await.unwrap().unwrap().asset_id);
  }

  assert_eq!(ids.len(), 1);
  assert_eq!(engine.list_assets(AssetQuery::default()).await.unwrap().len(), 1);
  assert_eq!(count_objects(dir.path()), 1);
}

#[tokio::test]
async fn tampered_content_is_integrity_error() {
  let dir = TempDir::new().unwrap();
  let mut config = config(&dir);
  config.cache.max_bytes = 0;
  let engine = open(config.clone()).await;

  let asset = engine.put_asset(blob("precious")).await.unwrap();
  let path = object_path(&config, &asset.asset_id);
  let mut bytes = fs::read(&path).unwrap();
  *bytes.last_mut().unwrap() ^= 0xff;
  fs::write(&path, bytes).unwrap();

  let err = engine.get_asset(&asset.asset_id).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Integrity);
}

#[tokio::test]
async fn encrypted_store_roundtrips_without_plaintext_on_disk() {
  let dir = TempDir::new().unwrap();
  let mut config = config(&dir);
  config.encryption.enabled = true;
  config.encryption.key_hex = Some("ab".repeat(32));
  config.compression.enabled = true;
  let engine = open(config.clone()).await;

  let text = "a secret that compresses well ".repeat(20);
  let asset = engine.put_asset(blob(&text)).await.unwrap();
  let on_disk = fs::read(object_path(&config, &asset.asset_id)).unwrap();
  assert!(!on_disk.windows(8).any(|w| w == b"a secret"));

  let (_, data) = engine.get_asset(&asset.asset_id).await.unwrap();
  assert_eq!(data, text.as_bytes());
  let stats = engine.stats().await.unwrap();
  assert!(stats.encrypted && stats.compressed);
}

// ─── Rollback and deadlines ──────────────────────────────────────────────────

#[tokio::test]
async fn vector_failure_rolls_back_content() {
  let dir = TempDir::new().unwrap();
  let config = config(&dir);
  let engine = open_with_index(config.clone(), Arc::new(FailingIndex)).await;

  let new = blob("doomed").with_embedding(vec![1.0, 0.0, 0.0, 0.0]);
  let id = HashAlgorithm::Sha256.content_id(b"doomed");
  let err = engine.put_asset(new).await.unwrap_err();

  assert_eq!(err.kind(), ErrorKind::TransactionFailed);
  assert_eq!(err.root_cause().kind(), ErrorKind::Io);
  assert!(!object_path(&config, &id).exists());
  assert_eq!(engine.get_asset_record(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
  assert_eq!(engine.stats().await.unwrap().asset_count, 0);
}

#[tokio::test]
async fn rollback_keeps_content_it_did_not_write() {
  let dir = TempDir::new().unwrap();
  let config = config(&dir);
  let store = ContentStore::open(&config.storage_root, ContentStoreOptions {
    shard_depth: config.shard_depth,
    ..ContentStoreOptions::default()
  })
  .unwrap();
  let outcome = store.put("already here".into()).await.unwrap();
  assert!(outcome.newly_written);

  let engine = open_with_index(config.clone(), Arc::new(FailingIndex)).await;
  let err = engine
    .put_asset(blob("already here").with_embedding(vec![0.0, 1.0, 0.0, 0.0]))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::TransactionFailed);
  assert!(object_path(&config, &outcome.id).exists());
}

#[tokio::test]
async fn expired_deadline_writes_nothing() {
  let dir = TempDir::new().unwrap();
  let engine = open(config(&dir)).await;
  let err = engine
    .put_asset_with_deadline(blob("late"), Deadline::after(Duration::ZERO))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Timeout { operation: "put_asset" }));
  assert_eq!(count_objects(dir.path()), 0);
}

#[tokio::test]
async fn deadline_expiring_mid_put_rolls_back() {
  let dir = TempDir::new().unwrap();
  let config = config(&dir);
  let index = Arc::new(SlowIndex(FlatIndex::new(DIM)));
  let engine = open_with_index(config.clone(), index.clone()).await;

  let id = HashAlgorithm::Sha256.content_id(b"slow");
  let err = engine
    .put_asset_with_deadline(
      blob("slow").with_embedding(vec![1.0, 1.0, 0.0, 0.0]),
      Deadline::after(Duration::from_millis(10)),
    )
    .await
    .unwrap_err();

  assert_eq!(err.kind(), ErrorKind::Timeout);
  assert!(!object_path(&config, &id).exists());
  assert!(index.is_empty());
  assert_eq!(engine.stats().await.unwrap().asset_count, 0);
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn hello_snapshot_delete_scenario() {
  let dir = TempDir::new().unwrap();
  let engine = open(config(&dir)).await;

  let asset = engine
    .put_asset(blob("hello").with_embedding(vec![0.1, 0.2, 0.3, 0.4]))
    .await
    .unwrap();
  let snapshot = engine
    .create_snapshot("ns", &[asset.asset_id.clone()], None, None)
    .await
    .unwrap();
  assert_eq!(snapshot.signer, hex::encode(engine.public_key().to_bytes()));
  assert!(engine.verify_snapshot(snapshot.snapshot_id, &engine.public_key()).await.unwrap());

  assert_eq!(engine.delete_asset(&asset.asset_id).await.unwrap(), DeleteOutcome::Tombstoned);
  assert_eq!(engine.get_asset(&asset.asset_id).await.unwrap_err().kind(), ErrorKind::NotFound);

  match engine.verify_snapshot(snapshot.snapshot_id, &engine.public_key()).await {
    Err(Error::RootMismatch { expected, missing, .. }) => {
      assert_eq!(expected, snapshot.merkle_root);
      assert_eq!(missing, vec![asset.asset_id]);
    }
    other => panic!("expected RootMismatch, got {other:?}"),
  }
}

#[tokio::test]
async fn foreign_key_fails_signature_check() {
  let dir = TempDir::new().unwrap();
  let engine = open(config(&dir)).await;
  let a = engine.put_asset(blob("a")).await.unwrap();
  let snapshot = engine.create_snapshot("ns", &[a.asset_id], None, None).await.unwrap();

  let other = SigningKey::from_bytes(&[9u8; 32]).verifying_key();
  let err = engine.verify_snapshot(snapshot.snapshot_id, &other).await.unwrap_err();
  assert!(matches!(err, Error::SignatureInvalid { .. }));
  assert!(err.is_integrity());
}

#[tokio::test]
async fn snapshot_with_missing_ids_persists_nothing() {
  let dir = TempDir::new().unwrap();
  let engine = open(config(&dir)).await;
  let a = engine.put_asset(blob("a")).await.unwrap();
  let b = HashAlgorithm::Sha256.content_id(b"b");
  let c = HashAlgorithm::Sha256.content_id(b"c");

  let err = engine
    .create_snapshot("ns", &[a.asset_id, b.clone(), c.clone(), b.clone()], None, None)
    .await
    .unwrap_err();
  match err {
    Error::AssetNotFound { missing } => assert_eq!(missing, vec![b, c]),
    other => panic!("expected AssetNotFound, got {other:?}"),
  }
  assert!(engine.list_snapshots(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn snapshot_dedupes_and_proves_membership() {
  let dir = TempDir::new().unwrap();
  let engine = open(config(&dir)).await;
  let mut ids = Vec::new();
  for name in ["a", "b", "c"] {
    ids.push(engine.put_asset(blob(name)).await.unwrap().asset_id);
  }
  let request = [ids[2].clone(), ids[0].clone(), ids[2].clone(), ids[1].clone()];
  let snapshot = engine.create_snapshot("release", &request, None, None).await.unwrap();
  assert_eq!(snapshot.asset_ids, vec![ids[2].clone(), ids[0].clone(), ids[1].clone()]);

  let root = merkle::parse_root(&snapshot.merkle_root).unwrap();
  for id in &ids {
    let proof = engine.snapshot_proof(snapshot.snapshot_id, id).await.unwrap();
    assert!(verify_proof(id, &proof, &root));
  }
  let outsider = HashAlgorithm::Sha256.content_id(b"d");
  assert_eq!(
    engine.snapshot_proof(snapshot.snapshot_id, &outsider).await.unwrap_err().kind(),
    ErrorKind::NotFound
  );

  let listed = engine.list_snapshots(Some("release")).await.unwrap();
  assert_eq!(listed, vec![snapshot.clone()]);
  assert!(engine.list_snapshots(Some("other")).await.unwrap().is_empty());
  assert_eq!(engine.get_snapshot(snapshot.snapshot_id).await.unwrap(), snapshot);
}

#[tokio::test]
async fn tampered_member_breaks_snapshot_root() {
  let dir = TempDir::new().unwrap();
  let mut config = config(&dir);
  config.cache.max_bytes = 0;
  let engine = open(config.clone()).await;

  let a = engine.put_asset(blob("a")).await.unwrap().asset_id;
  let b = engine.put_asset(blob("b")).await.unwrap().asset_id;
  let snapshot = engine.create_snapshot("ns", &[a.clone(), b.clone()], None, None).await.unwrap();

  let path = object_path(&config, &b);
  let mut bytes = fs::read(&path).unwrap();
  *bytes.last_mut().unwrap() ^= 0x01;
  fs::write(&path, bytes).unwrap();

  match engine.verify_snapshot(snapshot.snapshot_id, &engine.public_key()).await {
    Err(Error::RootMismatch { missing, .. }) => assert_eq!(missing, vec![b]),
    other => panic!("expected RootMismatch, got {other:?}"),
  }
}

// ─── Delete ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_policy_follows_snapshot_expiry() {
  let dir = TempDir::new().unwrap();
  let engine = open(config(&dir)).await;

  let parent = engine.put_asset(blob("parent")).await.unwrap().asset_id;
  let child = engine
    .put_asset(
      blob("child").with_parent(ParentLink::new(parent.clone(), Transform::new("t", "d"))),
    )
    .await
    .unwrap()
    .asset_id;

  let expired = Utc::now() - chrono::Duration::hours(1);
  engine.create_snapshot("old", &[child.clone()], None, Some(expired)).await.unwrap();
  assert_eq!(engine.delete_asset(&child).await.unwrap(), DeleteOutcome::Removed);
  let lineage = engine.get_lineage(&parent, LineageDirection::Descendants, 5).await.unwrap();
  assert!(lineage.is_empty());

  let live = Utc::now() + chrono::Duration::hours(1);
  engine.create_snapshot("new", &[parent.clone()], None, Some(live)).await.unwrap();
  assert_eq!(engine.delete_asset(&parent).await.unwrap(), DeleteOutcome::Tombstoned);
  assert_eq!(engine.delete_asset(&parent).await.unwrap_err().kind(), ErrorKind::NotFound);
  assert_eq!(count_objects(dir.path()), 0);
}

#[tokio::test]
async fn reput_after_tombstone_revives() {
  let dir = TempDir::new().unwrap();
  let engine = open(config(&dir)).await;
  let id = engine.put_asset(blob("phoenix")).await.unwrap().asset_id;
  engine.create_snapshot("ns", &[id.clone()], None, None).await.unwrap();
  engine.delete_asset(&id).await.unwrap();

  let again = engine.put_asset(blob("phoenix")).await.unwrap();
  assert_eq!(again.asset_id, id);
  let (_, data) = engine.get_asset(&id).await.unwrap();
  assert_eq!(&data[..], b"phoenix");
}

#[tokio::test]
async fn failed_record_delete_leaves_asset_readable() {
  let dir = TempDir::new().unwrap();
  let store = FailingDeletes(SqliteStore::open_in_memory().await.unwrap());
  let engine = AssetManager::builder(config(&dir))
    .signing_key(signing_key())
    .with_store(store)
    .await
    .expect("engine opens");

  let id = engine
    .put_asset(blob("keep me").with_embedding(vec![0.0, 0.0, 1.0, 0.0]))
    .await
    .unwrap()
    .asset_id;
  let err = engine.delete_asset(&id).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Metadata);

  let (_, data) = engine.get_asset(&id).await.unwrap();
  assert_eq!(&data[..], b"keep me");
  let hits = engine.vector_search(&[0.0, 0.0, 1.0, 0.0], 1, None).await.unwrap();
  assert_eq!(hits[0].asset.asset_id, id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parent_delete_racing_child_put() {
  let dir = TempDir::new().unwrap();
  let engine = Arc::new(open(config(&dir)).await);

  for round in 0..40 {
    let parent = engine.put_asset(blob(&format!("parent {round}"))).await.unwrap().asset_id;
    let put = {
      let (engine, parent) = (engine.clone(), parent.clone());
      tokio::spawn(async move {
        let link = ParentLink::new(parent, Transform::new("t", "d"));
        engine.put_asset(blob(&format!("child {round}")).with_parent(link)).await
      })
    };
    let delete = {
      let (engine, parent) = (engine.clone(), parent.clone());
      tokio::spawn(async move { engine.delete_asset(&parent).await })
    };

    assert_eq!(delete.await.unwrap().unwrap(), DeleteOutcome::Removed);
    match put.await.unwrap() {
      // The child landed first; removing the parent took the edge with it.
      Ok(child) => {
        let up = engine
          .get_lineage(&child.asset_id, LineageDirection::Ancestors, 1)
          .await
          .unwrap();
        assert!(up.is_empty(), "round {round}: edge to a removed parent survived");
      }
      Err(e) => assert_eq!(e.kind(), ErrorKind::AssetNotFound, "round {round}: {e}"),
    }
  }
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_hydrates_and_drops_orphans() {
  let dir = TempDir::new().unwrap();
  let index = Arc::new(FlatIndex::new(DIM));
  let engine = open_with_index(config(&dir), index.clone()).await;

  let near = blob("near")
    .with_embedding(vec![1.0, 0.0, 0.0, 0.0])
    .with_metadata("lang", "en".into());
  let far = blob("far")
    .with_embedding(vec![0.0, 1.0, 0.0, 0.0])
    .with_metadata("lang", "fr".into());
  let near = engine.put_asset(near).await.unwrap();
  let far = engine.put_asset(far).await.unwrap();
  // An entry with no record behind it.
  let ghost = HashAlgorithm::Sha256.content_id(b"ghost");
  index.add(&ghost, &[0.9, 0.1, 0.0, 0.0]).unwrap();

  let hits = engine.vector_search(&[1.0, 0.0, 0.0, 0.0], 10, None).await.unwrap();
  let ids: Vec<_> = hits.iter().map(|h| h.asset.asset_id.clone()).collect();
  assert_eq!(ids, vec![near.asset_id.clone(), far.asset_id.clone()]);
  assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

  let filter: FilterFields = [("lang".to_owned(), "fr".to_owned())].into();
  let hits = engine.vector_search(&[1.0, 0.0, 0.0, 0.0], 10, Some(&filter)).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].asset.asset_id, far.asset_id);

  engine.delete_asset(&near.asset_id).await.unwrap();
  let hits = engine.vector_search(&[1.0, 0.0, 0.0, 0.0], 10, None).await.unwrap();
  assert!(hits.iter().all(|h| h.asset.asset_id != near.asset_id));

  assert!(matches!(
    engine.vector_search(&[1.0, 0.0], 3, None).await,
    Err(Error::DimensionMismatch { expected: DIM, actual: 2 })
  ));
}

#[tokio::test]
async fn vector_index_survives_reopen() {
  let dir = TempDir::new().unwrap();
  let config = config(&dir);
  let id = {
    let engine = open(config.clone()).await;
    let id = engine
      .put_asset(blob("kept").with_embedding(vec![0.0, 0.0, 1.0, 0.0]))
      .await
      .unwrap()
      .asset_id;
    engine.flush().await.unwrap();
    engine.put_asset(blob("unflushed").with_embedding(vec![0.0, 0.0, 0.0, 1.0])).await.unwrap();
    id
  };

  // The persisted index missed the second insert, so it is rebuilt from records.
  let engine = open(config).await;
  let stats = engine.stats().await.unwrap();
  assert_eq!(stats.vector.backend, BackendKind::Flat);
  assert_eq!(stats.vector.count, 2);
  let hits = engine.vector_search(&[0.0, 0.0, 1.0, 0.0], 1, None).await.unwrap();
  assert_eq!(hits[0].asset.asset_id, id);
}

// ─── Lineage ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn lineage_rejects_cycles_and_walks_by_depth() {
  let dir = TempDir::new().unwrap();
  let engine = open(config(&dir)).await;

  let a = engine.put_asset(blob("a")).await.unwrap().asset_id;
  let b = engine
    .put_asset(blob("b").with_parent(ParentLink::new(a.clone(), Transform::new("resize", "1"))))
    .await
    .unwrap()
    .asset_id;
  let c = engine.put_asset(blob("c")).await.unwrap().asset_id;
  engine.add_relationship(&b, &c, Transform::new("embed", "2")).await.unwrap();

  for (parent, child) in [(&c, &a), (&b, &a), (&a, &a)] {
    let err = engine.add_relationship(parent, child, Transform::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CycleDetected);
  }

  let down = engine.get_lineage(&a, LineageDirection::Descendants, 10).await.unwrap();
  assert_eq!(down.len(), 2);
  assert_eq!((down[0].depth, down[1].depth), (1, 2));
  let shallow = engine.get_lineage(&a, LineageDirection::Descendants, 1).await.unwrap();
  assert_eq!(shallow.len(), 1);
  let up = engine.get_lineage(&c, LineageDirection::Ancestors, 10).await.unwrap();
  assert_eq!(up.len(), 2);

  let record = engine.get_asset_record(&b).await.unwrap();
  assert_eq!(record.parents.len(), 1);
  assert_eq!(record.children, vec![c.clone()]);
  assert_eq!(engine.stats().await.unwrap().relationship_count, 2);
}

#[tokio::test]
async fn missing_parent_is_rejected() {
  let dir = TempDir::new().unwrap();
  let engine = open(config(&dir)).await;
  let ghost = HashAlgorithm::Sha256.content_id(b"ghost");
  let err = engine
    .put_asset(blob("orphan").with_parent(ParentLink::new(ghost.clone(), Transform::default())))
    .await
    .unwrap_err();
  match err {
    Error::AssetNotFound { missing } => assert_eq!(missing, vec![ghost]),
    other => panic!("expected AssetNotFound, got {other:?}"),
  }
  assert_eq!(count_objects(dir.path()), 0);
}

#[tokio::test]
async fn reput_must_match_recorded_lineage() {
  let dir = TempDir::new().unwrap();
  let engine = open(config(&dir)).await;
  let parent = engine.put_asset(blob("source")).await.unwrap().asset_id;
  let child = engine.put_asset(blob("derived")).await.unwrap().asset_id;

  let link = ParentLink::new(parent.clone(), Transform::new("crop", "v1"));
  let err = engine.put_asset(blob("derived").with_parent(link.clone())).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);
  assert!(engine.get_lineage(&child, LineageDirection::Ancestors, 1).await.unwrap().is_empty());

  // Once the edge exists, the same request is a plain dedup.
  engine.add_relationship(&parent, &child, Transform::new("crop", "v1")).await.unwrap();
  let again = engine.put_asset(blob("derived").with_parent(link)).await.unwrap();
  assert_eq!(again.parents.len(), 1);
  assert_eq!(engine.stats().await.unwrap().relationship_count, 1);
}

#[tokio::test]
async fn lineage_reloads_from_store() {
  let dir = TempDir::new().unwrap();
  let config = config(&dir);
  let (a, b) = {
    let engine = open(config.clone()).await;
    let a = engine.put_asset(blob("a")).await.unwrap().asset_id;
    let b = engine.put_asset(blob("b")).await.unwrap().asset_id;
    engine.add_relationship(&a, &b, Transform::default()).await.unwrap();
    (a, b)
  };
  let engine = open(config).await;
  let err = engine.add_relationship(&b, &a, Transform::default()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::CycleDetected);
}

#[tokio::test]
async fn missing_signing_key_is_configuration_error() {
  let dir = TempDir::new().unwrap();
  let err = AssetManager::open(config(&dir)).await.err().expect("open fails");
  assert_eq!(err.kind(), ErrorKind::Configuration);

  crate::crypto::generate_signing_key(&config(&dir).signing_key_path()).unwrap();
  let engine = AssetManager::open(config(&dir)).await.unwrap();
  assert_eq!(engine.list_assets(AssetQuery::default()).await.unwrap().len(), 0);
}
