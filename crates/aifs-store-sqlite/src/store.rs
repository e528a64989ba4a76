//! [`SqliteStore`], the SQLite implementation of [`MetadataStore`].

use std::path::Path;

use aifs_core::{
  Asset, AssetId, Relationship, Snapshot,
  store::{AssetQuery, MetadataStore},
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    RawAsset, RawRelationship, RawSnapshot, encode_dt, encode_embedding, encode_metadata,
    encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An AIFS metadata store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::debug!("metadata schema initialised");
    Ok(())
  }
}

// ─── Row loaders ─────────────────────────────────────────────────────────────
//
// Plain functions over a borrowed connection so they can be composed inside a
// single `call` closure.

/// Load a live asset row and attach its parent edges and child ids.
fn load_asset(conn: &Connection, id: &str) -> rusqlite::Result<Option<RawAsset>> {
  let sql = format!(
    "SELECT {} FROM assets WHERE asset_id = ?1 AND deleted_at IS NULL",
    RawAsset::COLUMNS
  );
  let Some(mut raw) = conn
    .query_row(&sql, rusqlite::params![id], RawAsset::from_row)
    .optional()?
  else {
    return Ok(None);
  };
  attach_edges(conn, &mut raw)?;
  Ok(Some(raw))
}

fn attach_edges(conn: &Connection, raw: &mut RawAsset) -> rusqlite::Result<()> {
  let parents_sql = format!(
    "SELECT {} FROM relationships WHERE child_id = ?1 ORDER BY rowid",
    RawRelationship::COLUMNS
  );
  let mut stmt = conn.prepare_cached(&parents_sql)?;
  raw.parents = stmt
    .query_map(rusqlite::params![raw.asset_id], RawRelationship::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut stmt = conn.prepare_cached(
    "SELECT child_id FROM relationships WHERE parent_id = ?1
     GROUP BY child_id ORDER BY MIN(rowid)",
  )?;
  raw.children = stmt
    .query_map(rusqlite::params![raw.asset_id], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(())
}

fn load_snapshot_assets(conn: &Connection, raw: &mut RawSnapshot) -> rusqlite::Result<()> {
  let mut stmt = conn.prepare_cached(
    "SELECT asset_id FROM snapshot_assets WHERE snapshot_id = ?1 ORDER BY position",
  )?;
  raw.asset_ids = stmt
    .query_map(rusqlite::params![raw.snapshot_id], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(())
}

fn query_snapshots(
  conn: &Connection,
  sql: &str,
  params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<RawSnapshot>> {
  let mut stmt = conn.prepare(sql)?;
  let mut raws = stmt
    .query_map(params, RawSnapshot::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  for raw in &mut raws {
    load_snapshot_assets(conn, raw)?;
  }
  Ok(raws)
}

/// Encoded columns of one relationship, ready to bind.
struct EdgeRow {
  relationship_id:  String,
  parent_id:        String,
  child_id:         String,
  kind:             String,
  transform_name:   String,
  transform_digest: String,
  created_at:       String,
  metadata:         String,
}

impl EdgeRow {
  fn encode(edge: &Relationship) -> Result<Self> {
    Ok(Self {
      relationship_id:  encode_uuid(edge.relationship_id),
      parent_id:        edge.parent_id.to_string(),
      child_id:         edge.child_id.to_string(),
      kind:             edge.kind.to_string(),
      transform_name:   edge.transform.name.clone(),
      transform_digest: edge.transform.digest.clone(),
      created_at:       encode_dt(edge.created_at),
      metadata:         encode_metadata(&edge.metadata)?,
    })
  }

  fn insert(&self, conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
      "INSERT INTO relationships (
         relationship_id, parent_id, child_id, kind,
         transform_name, transform_digest, created_at, metadata
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
      rusqlite::params![
        self.relationship_id,
        self.parent_id,
        self.child_id,
        self.kind,
        self.transform_name,
        self.transform_digest,
        self.created_at,
        self.metadata,
      ],
    )?;
    Ok(())
  }
}

// ─── MetadataStore impl ──────────────────────────────────────────────────────

impl MetadataStore for SqliteStore {
  type Error = crate::Error;

  // ── Assets ────────────────────────────────────────────────────────────────

  async fn insert_asset(&self, asset: Asset, edges: Vec<Relationship>) -> Result<()> {
    let asset_id_str   = asset.asset_id.to_string();
    let kind_str       = asset.kind.to_string();
    let size           = asset.size as i64;
    let algorithm_str  = asset.hash_algorithm.to_string();
    let embedding_blob = asset.embedding.as_deref().map(encode_embedding);
    let metadata_str   = encode_metadata(&asset.metadata)?;
    let created_at_str = encode_dt(asset.created_at);
    let edge_rows      = edges.iter().map(EdgeRow::encode).collect::<Result<Vec<_>>>()?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        // A tombstoned row with the same content is revived in place; a live
        // one is a conflict.
        let changed = tx.execute(
          "INSERT INTO assets (
             asset_id, kind, size, hash_algorithm, embedding, metadata, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT(asset_id) DO UPDATE SET
             kind           = excluded.kind,
             size           = excluded.size,
             hash_algorithm = excluded.hash_algorithm,
             embedding      = excluded.embedding,
             metadata       = excluded.metadata,
             created_at     = excluded.created_at,
             deleted_at     = NULL
           WHERE assets.deleted_at IS NOT NULL",
          rusqlite::params![
            asset_id_str,
            kind_str,
            size,
            algorithm_str,
            embedding_blob,
            metadata_str,
            created_at_str,
          ],
        )?;
        if changed != 1 {
          return Err(rusqlite::Error::StatementChangedRows(changed).into());
        }
        for row in &edge_rows {
          row.insert(&tx)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_asset(&self, id: AssetId) -> Result<Option<Asset>> {
    let id_str = id.to_string();
    let raw = self
      .conn
      .call(move |conn| Ok(load_asset(conn, &id_str)?))
      .await?;
    raw.map(RawAsset::into_asset).transpose()
  }

  async fn list_assets(&self, query: AssetQuery) -> Result<Vec<Asset>> {
    let kind_str   = query.kind.map(|k| k.to_string());
    let limit_val  = query.limit.unwrap_or(100) as i64;
    let offset_val = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawAsset> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM assets
           WHERE deleted_at IS NULL AND (?1 IS NULL OR kind = ?1)
           ORDER BY created_at DESC, asset_id
           LIMIT ?2 OFFSET ?3",
          RawAsset::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt
          .query_map(
            rusqlite::params![kind_str.as_deref(), limit_val, offset_val],
            RawAsset::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        for raw in &mut rows {
          attach_edges(conn, raw)?;
        }
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAsset::into_asset).collect()
  }

  async fn count_assets(&self) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM assets WHERE deleted_at IS NULL",
          [],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(count.max(0) as u64)
  }

  async fn existing_assets(&self, ids: Vec<AssetId>) -> Result<Vec<AssetId>> {
    let found: Vec<bool> = {
      let id_strs: Vec<String> = ids.iter().map(AssetId::to_string).collect();
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare_cached(
            "SELECT 1 FROM assets WHERE asset_id = ?1 AND deleted_at IS NULL",
          )?;
          let mut out = Vec::with_capacity(id_strs.len());
          for id in &id_strs {
            out.push(stmt.exists(rusqlite::params![id])?);
          }
          Ok(out)
        })
        .await?
    };

    Ok(
      ids
        .into_iter()
        .zip(found)
        .filter_map(|(id, present)| present.then_some(id))
        .collect(),
    )
  }

  async fn embedded_assets(&self) -> Result<Vec<Asset>> {
    let raws: Vec<RawAsset> = self
      .conn
      .call(|conn| {
        let sql = format!(
          "SELECT {} FROM assets
           WHERE deleted_at IS NULL AND embedding IS NOT NULL
           ORDER BY rowid",
          RawAsset::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], RawAsset::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAsset::into_asset).collect()
  }

  async fn remove_asset(&self, id: AssetId) -> Result<bool> {
    let id_str = id.to_string();
    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM relationships WHERE parent_id = ?1 OR child_id = ?1",
          rusqlite::params![id_str],
        )?;
        let n = tx.execute("DELETE FROM assets WHERE asset_id = ?1", rusqlite::params![id_str])?;
        tx.commit()?;
        Ok(n > 0)
      })
      .await?;
    Ok(removed)
  }

  async fn tombstone_asset(&self, id: AssetId, at: DateTime<Utc>) -> Result<bool> {
    let id_str = id.to_string();
    let at_str = encode_dt(at);
    let updated = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE assets SET deleted_at = ?2 WHERE asset_id = ?1 AND deleted_at IS NULL",
          rusqlite::params![id_str, at_str],
        )?;
        Ok(n > 0)
      })
      .await?;
    Ok(updated)
  }

  // ── Lineage ───────────────────────────────────────────────────────────────

  async fn insert_relationship(&self, edge: Relationship) -> Result<()> {
    let row = EdgeRow::encode(&edge)?;
    self
      .conn
      .call(move |conn| Ok(row.insert(conn)?))
      .await?;
    Ok(())
  }

  async fn list_relationships(&self) -> Result<Vec<Relationship>> {
    let raws: Vec<RawRelationship> = self
      .conn
      .call(|conn| {
        let sql = format!(
          "SELECT {} FROM relationships ORDER BY rowid",
          RawRelationship::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], RawRelationship::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRelationship::into_relationship).collect()
  }

  // ── Snapshots ─────────────────────────────────────────────────────────────

  async fn insert_snapshot(&self, snapshot: Snapshot) -> Result<()> {
    let id_str         = encode_uuid(snapshot.snapshot_id);
    let created_at_str = encode_dt(snapshot.created_at);
    let expires_at_str = snapshot.expires_at.map(encode_dt);
    let metadata_str   = encode_metadata(&snapshot.metadata)?;
    let asset_strs: Vec<String> = snapshot.asset_ids.iter().map(AssetId::to_string).collect();
    let Snapshot { namespace, merkle_root, signature, signer, .. } = snapshot;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO snapshots (
             snapshot_id, namespace, merkle_root, signature, signer,
             created_at, expires_at, metadata
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            namespace,
            merkle_root,
            signature,
            signer,
            created_at_str,
            expires_at_str,
            metadata_str,
          ],
        )?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO snapshot_assets (snapshot_id, position, asset_id)
             VALUES (?1, ?2, ?3)",
          )?;
          for (position, asset_id) in asset_strs.iter().enumerate() {
            stmt.execute(rusqlite::params![id_str, position as i64, asset_id])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_snapshot(&self, id: Uuid) -> Result<Option<Snapshot>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM snapshots WHERE snapshot_id = ?1",
          RawSnapshot::COLUMNS
        );
        Ok(query_snapshots(conn, &sql, rusqlite::params![id_str])?.pop())
      })
      .await?;
    raw.map(RawSnapshot::into_snapshot).transpose()
  }

  async fn list_snapshots(&self, namespace: Option<String>) -> Result<Vec<Snapshot>> {
    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM snapshots
           WHERE (?1 IS NULL OR namespace = ?1)
           ORDER BY created_at DESC, snapshot_id",
          RawSnapshot::COLUMNS
        );
        Ok(query_snapshots(conn, &sql, rusqlite::params![namespace.as_deref()])?)
      })
      .await?;
    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }

  async fn snapshots_referencing(&self, id: AssetId) -> Result<Vec<Snapshot>> {
    let id_str = id.to_string();
    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM snapshots
           WHERE snapshot_id IN (SELECT snapshot_id FROM snapshot_assets WHERE asset_id = ?1)
           ORDER BY created_at DESC, snapshot_id",
          RawSnapshot::COLUMNS
        );
        Ok(query_snapshots(conn, &sql, rusqlite::params![id_str])?)
      })
      .await?;
    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }
}
