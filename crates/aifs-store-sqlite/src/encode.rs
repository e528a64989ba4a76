//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings with microsecond precision.
//! Metadata maps are stored as compact JSON. Embeddings are stored as
//! little-endian `f32` blobs. UUIDs are stored as hyphenated lowercase strings.

use aifs_core::{
  Asset, AssetId, AssetKind, HashAlgorithm, Metadata, ParentLink, Relationship,
  RelationshipKind, Snapshot, Transform,
};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Fixed-width microsecond form, so text order is time order.
pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Metadata ────────────────────────────────────────────────────────────────

pub fn encode_metadata(m: &Metadata) -> Result<String> { Ok(serde_json::to_string(m)?) }

pub fn decode_metadata(s: &str) -> Result<Metadata> { Ok(serde_json::from_str(s)?) }

// ─── Embedding ───────────────────────────────────────────────────────────────

pub fn encode_embedding(v: &[f32]) -> Vec<u8> {
  v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn decode_embedding(b: &[u8]) -> Result<Vec<f32>> {
  if b.len() % 4 != 0 {
    return Err(Error::Corrupt {
      column: "embedding",
      reason: format!("{} bytes is not a whole number of f32s", b.len()),
    });
  }
  Ok(
    b.chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect(),
  )
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_hash_algorithm(s: &str) -> Result<HashAlgorithm> {
  s.parse()
    .map_err(|_| aifs_core::Error::UnknownHashAlgorithm(s.to_owned()).into())
}

pub fn decode_relationship_kind(s: &str) -> Result<RelationshipKind> {
  s.parse()
    .map_err(|_| aifs_core::Error::UnknownRelationshipKind(s.to_owned()).into())
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw columns of a `relationships` row.
pub struct RawRelationship {
  pub relationship_id:  String,
  pub parent_id:        String,
  pub child_id:         String,
  pub kind:             String,
  pub transform_name:   String,
  pub transform_digest: String,
  pub created_at:       String,
  pub metadata:         String,
}

impl RawRelationship {
  pub const COLUMNS: &'static str = "relationship_id, parent_id, child_id, kind, \
     transform_name, transform_digest, created_at, metadata";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      relationship_id:  row.get(0)?,
      parent_id:        row.get(1)?,
      child_id:         row.get(2)?,
      kind:             row.get(3)?,
      transform_name:   row.get(4)?,
      transform_digest: row.get(5)?,
      created_at:       row.get(6)?,
      metadata:         row.get(7)?,
    })
  }

  pub fn into_relationship(self) -> Result<Relationship> {
    Ok(Relationship {
      relationship_id: decode_uuid(&self.relationship_id)?,
      parent_id:       AssetId::parse(&self.parent_id)?,
      child_id:        AssetId::parse(&self.child_id)?,
      kind:            decode_relationship_kind(&self.kind)?,
      transform:       Transform::new(self.transform_name, self.transform_digest),
      created_at:      decode_dt(&self.created_at)?,
      metadata:        decode_metadata(&self.metadata)?,
    })
  }

  fn into_parent_link(self) -> Result<ParentLink> {
    Ok(ParentLink {
      asset_id:  AssetId::parse(&self.parent_id)?,
      kind:      decode_relationship_kind(&self.kind)?,
      transform: Transform::new(self.transform_name, self.transform_digest),
    })
  }
}

/// Raw columns of an `assets` row plus its resolved edges.
pub struct RawAsset {
  pub asset_id:       String,
  pub kind:           String,
  pub size:           i64,
  pub hash_algorithm: String,
  pub embedding:      Option<Vec<u8>>,
  pub metadata:       String,
  pub created_at:     String,
  // relationships join
  pub parents:        Vec<RawRelationship>,
  pub children:       Vec<String>,
}

impl RawAsset {
  pub const COLUMNS: &'static str =
    "asset_id, kind, size, hash_algorithm, embedding, metadata, created_at";

  /// Read the asset columns; edges are filled in by the caller.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      asset_id:       row.get(0)?,
      kind:           row.get(1)?,
      size:           row.get(2)?,
      hash_algorithm: row.get(3)?,
      embedding:      row.get(4)?,
      metadata:       row.get(5)?,
      created_at:     row.get(6)?,
      parents:        Vec::new(),
      children:       Vec::new(),
    })
  }

  pub fn into_asset(self) -> Result<Asset> {
    let size = u64::try_from(self.size).map_err(|_| Error::Corrupt {
      column: "size",
      reason: format!("negative size {}", self.size),
    })?;

    Ok(Asset {
      asset_id: AssetId::parse(&self.asset_id)?,
      kind: AssetKind::from(self.kind),
      size,
      hash_algorithm: decode_hash_algorithm(&self.hash_algorithm)?,
      embedding: self.embedding.as_deref().map(decode_embedding).transpose()?,
      metadata: decode_metadata(&self.metadata)?,
      created_at: decode_dt(&self.created_at)?,
      parents: self
        .parents
        .into_iter()
        .map(RawRelationship::into_parent_link)
        .collect::<Result<_>>()?,
      children: self
        .children
        .iter()
        .map(|c| AssetId::parse(c).map_err(Error::from))
        .collect::<Result<_>>()?,
    })
  }
}

/// Raw columns of a `snapshots` row plus its ordered asset list.
pub struct RawSnapshot {
  pub snapshot_id: String,
  pub namespace:   String,
  pub merkle_root: String,
  pub signature:   String,
  pub signer:      String,
  pub created_at:  String,
  pub expires_at:  Option<String>,
  pub metadata:    String,
  // snapshot_assets join
  pub asset_ids:   Vec<String>,
}

impl RawSnapshot {
  pub const COLUMNS: &'static str = "snapshot_id, namespace, merkle_root, signature, \
     signer, created_at, expires_at, metadata";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      snapshot_id: row.get(0)?,
      namespace:   row.get(1)?,
      merkle_root: row.get(2)?,
      signature:   row.get(3)?,
      signer:      row.get(4)?,
      created_at:  row.get(5)?,
      expires_at:  row.get(6)?,
      metadata:    row.get(7)?,
      asset_ids:   Vec::new(),
    })
  }

  pub fn into_snapshot(self) -> Result<Snapshot> {
    Ok(Snapshot {
      snapshot_id: decode_uuid(&self.snapshot_id)?,
      namespace:   self.namespace,
      asset_ids:   self
        .asset_ids
        .iter()
        .map(|a| AssetId::parse(a).map_err(Error::from))
        .collect::<Result<_>>()?,
      merkle_root: self.merkle_root,
      signature:   self.signature,
      signer:      self.signer,
      created_at:  decode_dt(&self.created_at)?,
      expires_at:  self.expires_at.as_deref().map(decode_dt).transpose()?,
      metadata:    decode_metadata(&self.metadata)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedding_roundtrip_is_exact() {
    let v = vec![0.1_f32, -3.5, f32::MIN_POSITIVE, 1e30];
    assert_eq!(decode_embedding(&encode_embedding(&v)).unwrap(), v);
  }

  #[test]
  fn embedding_rejects_ragged_blob() {
    assert!(matches!(
      decode_embedding(&[0, 1, 2]),
      Err(Error::Corrupt { column: "embedding", .. })
    ));
  }
}
