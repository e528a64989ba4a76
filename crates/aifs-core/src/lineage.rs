//! Lineage edges: provenance links between assets.
//!
//! Edges are append-only. They are removed only when one of their endpoints
//! is hard-deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::asset::{AssetId, Metadata};

/// How a child relates to its parent.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RelationshipKind {
  #[default]
  Derived,
  Transformed,
  Contains,
}

/// Identifies the exact transform that produced a child.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Transform {
  /// Human-readable name, e.g. `"resize"` or `"embed:text-embedding-3"`.
  pub name:   String,
  /// Hash pinning the transform's code or parameters.
  pub digest: String,
}

impl Transform {
  pub fn new(name: impl Into<String>, digest: impl Into<String>) -> Self {
    Self { name: name.into(), digest: digest.into() }
  }
}

/// A directed parent → child edge in the provenance graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
  pub relationship_id: Uuid,
  pub parent_id:       AssetId,
  pub child_id:        AssetId,
  pub kind:            RelationshipKind,
  pub transform:       Transform,
  pub created_at:      DateTime<Utc>,
  pub metadata:        Metadata,
}

impl Relationship {
  /// A fresh edge stamped with a new id and the current time.
  pub fn new(
    parent_id: AssetId,
    child_id: AssetId,
    kind: RelationshipKind,
    transform: Transform,
  ) -> Self {
    Self {
      relationship_id: Uuid::new_v4(),
      parent_id,
      child_id,
      kind,
      transform,
      created_at: Utc::now(),
      metadata: Metadata::new(),
    }
  }
}

/// Which way to walk the provenance graph.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LineageDirection {
  Ancestors,
  Descendants,
}
