//! Snapshots: signed, immutable records of a named set of assets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::asset::{AssetId, Metadata};

/// A signed point-in-time record of a set of assets. Once written, no field
/// is ever updated; a new version is a new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub snapshot_id: Uuid,
  pub namespace:   String,
  /// Leaf order of the Merkle tree.
  pub asset_ids:   Vec<AssetId>,
  /// Hex-encoded Merkle root over `asset_ids`.
  pub merkle_root: String,
  /// Hex-encoded Ed25519 signature over (root, created_at, namespace).
  pub signature:   String,
  /// Hex-encoded public key of the signer.
  pub signer:      String,
  /// Microsecond precision; the signed timestamp.
  pub created_at:  DateTime<Utc>,
  /// Snapshots past expiry no longer protect their assets from hard
  /// deletion.
  pub expires_at:  Option<DateTime<Utc>>,
  pub metadata:    Metadata,
}

impl Snapshot {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expires_at.is_some_and(|at| at <= now)
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;
  use crate::HashAlgorithm;

  fn snapshot(expires_at: Option<DateTime<Utc>>) -> Snapshot {
    Snapshot {
      snapshot_id: Uuid::nil(),
      namespace: "ns".into(),
      asset_ids: vec![HashAlgorithm::Sha256.content_id(b"a")],
      merkle_root: String::new(),
      signature: String::new(),
      signer: String::new(),
      created_at: Utc::now(),
      expires_at,
      metadata: Metadata::new(),
    }
  }

  #[test]
  fn expiry() {
    let now = Utc::now();
    assert!(!snapshot(None).is_expired(now));
    assert!(snapshot(Some(now - Duration::seconds(1))).is_expired(now));
    assert!(!snapshot(Some(now + Duration::hours(1))).is_expired(now));
  }
}
