//! Asset types, the fundamental unit of the AIFS store.
//!
//! An asset is an immutable blob plus a small metadata envelope. Its id is the
//! content hash of the raw bytes, so storing the same bytes twice yields the
//! same asset.

use std::{collections::BTreeMap, fmt, str::FromStr};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  hash::HashAlgorithm,
  lineage::{RelationshipKind, Transform},
};

/// Free-form metadata attached to assets, relationships, and snapshots.
pub type Metadata = BTreeMap<String, serde_json::Value>;

// ─── AssetId ─────────────────────────────────────────────────────────────────

/// Lowercase hex encoding of a 32-byte content hash.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
  pub fn from_digest(digest: &[u8; 32]) -> Self { Self(hex::encode(digest)) }

  /// Parse and validate a hex id. Uppercase input is normalised.
  pub fn parse(s: &str) -> Result<Self> {
    let normalised = s.trim().to_ascii_lowercase();
    let valid = normalised.len() == 64
      && normalised.bytes().all(|b| b.is_ascii_hexdigit());
    if !valid {
      return Err(Error::InvalidAssetId(s.to_owned()));
    }
    Ok(Self(normalised))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for AssetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for AssetId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for AssetId {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<AssetId> for String {
  fn from(id: AssetId) -> Self { id.0 }
}

impl AsRef<str> for AssetId {
  fn as_ref(&self) -> &str { &self.0 }
}

// ─── AssetKind ───────────────────────────────────────────────────────────────

/// Coarse classification of an asset. The four named kinds mirror the gRPC
/// `AssetKind` enum; anything else is carried as a lowercase string, so kinds
/// compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetKind {
  #[default]
  Blob,
  Tensor,
  Embed,
  Artifact,
  Other(String),
}

impl AssetKind {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Blob => "blob",
      Self::Tensor => "tensor",
      Self::Embed => "embed",
      Self::Artifact => "artifact",
      Self::Other(s) => s,
    }
  }
}

impl fmt::Display for AssetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl From<&str> for AssetKind {
  fn from(s: &str) -> Self {
    let lower = s.trim().to_ascii_lowercase();
    match lower.as_str() {
      "blob" => Self::Blob,
      "tensor" => Self::Tensor,
      "embed" => Self::Embed,
      "artifact" => Self::Artifact,
      _ => Self::Other(lower),
    }
  }
}

impl From<String> for AssetKind {
  fn from(s: String) -> Self { Self::from(s.as_str()) }
}

impl From<AssetKind> for String {
  fn from(kind: AssetKind) -> Self { kind.as_str().to_owned() }
}

// ─── Lineage links ───────────────────────────────────────────────────────────

/// A link from a new asset to one of the assets it was produced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
  pub asset_id:  AssetId,
  #[serde(default)]
  pub kind:      RelationshipKind,
  pub transform: Transform,
}

impl ParentLink {
  pub fn new(asset_id: AssetId, transform: Transform) -> Self {
    Self { asset_id, kind: RelationshipKind::default(), transform }
  }
}

// ─── Asset ───────────────────────────────────────────────────────────────────

/// The persisted record of an asset. Content bytes live in the content store;
/// this is everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
  pub asset_id:       AssetId,
  pub kind:           AssetKind,
  /// Size of the original, uncompressed content in bytes.
  pub size:           u64,
  pub hash_algorithm: HashAlgorithm,
  pub embedding:      Option<Vec<f32>>,
  pub metadata:       Metadata,
  /// Server-assigned timestamp; never changes after creation.
  pub created_at:     DateTime<Utc>,
  /// Links recorded when the asset was put, in submission order.
  pub parents:        Vec<ParentLink>,
  /// Assets derived from this one, resolved at read time.
  #[serde(default)]
  pub children:       Vec<AssetId>,
}

impl Asset {
  /// Scalar metadata flattened to strings, plus the kind. Used as the filter
  /// fields of a vector index entry.
  pub fn filter_fields(&self) -> BTreeMap<String, String> {
    let mut fields: BTreeMap<String, String> = self
      .metadata
      .iter()
      .filter_map(|(k, v)| {
        let s = match v {
          serde_json::Value::String(s) => s.clone(),
          serde_json::Value::Number(n) => n.to_string(),
          serde_json::Value::Bool(b) => b.to_string(),
          _ => return None,
        };
        Some((k.clone(), s))
      })
      .collect();
    fields.insert("kind".to_owned(), self.kind.to_string());
    fields
  }
}

// ─── NewAsset ────────────────────────────────────────────────────────────────

/// Input to `AssetManager::put_asset`. The id, size, and timestamps are
/// always computed by the manager.
#[derive(Debug, Clone, Default)]
pub struct NewAsset {
  pub data:      Bytes,
  pub kind:      AssetKind,
  pub embedding: Option<Vec<f32>>,
  pub metadata:  Metadata,
  pub parents:   Vec<ParentLink>,
}

impl NewAsset {
  /// Convenience constructor with all optional fields set to their defaults.
  pub fn new(data: impl Into<Bytes>, kind: impl Into<AssetKind>) -> Self {
    Self { data: data.into(), kind: kind.into(), ..Self::default() }
  }

  pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
    self.embedding = Some(embedding);
    self
  }

  pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
    self.metadata.insert(key.into(), value);
    self
  }

  pub fn with_parent(mut self, parent: ParentLink) -> Self {
    self.parents.push(parent);
    self
  }
}
