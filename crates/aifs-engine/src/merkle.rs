//! Binary Merkle tree over asset ids.
//!
//! ```text
//! leaf = SHA-256(0x00 || asset id as UTF-8)
//! node = SHA-256(0x01 || left || right)
//! ```
//!
//! A level with an odd number of nodes pairs its last node with itself. The
//! root of an empty tree is SHA-256 of the empty string. The domain bytes keep
//! a leaf from ever being confused with an interior node.

use aifs_core::AssetId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

pub type Hash = [u8; 32];

pub fn leaf_hash(id: &AssetId) -> Hash {
  let mut h = Sha256::new();
  h.update([LEAF_PREFIX]);
  h.update(id.as_str().as_bytes());
  h.finalize().into()
}

pub fn node_hash(left: &Hash, right: &Hash) -> Hash {
  let mut h = Sha256::new();
  h.update([NODE_PREFIX]);
  h.update(left);
  h.update(right);
  h.finalize().into()
}

// ─── Proofs ──────────────────────────────────────────────────────────────────

/// Which side of the running hash a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
  Left,
  Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
  /// Hex-encoded sibling hash.
  pub hash: String,
  pub side: Side,
}

/// Sibling path from a leaf to the root, leaf level first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
  pub leaf_index: usize,
  pub steps:      Vec<ProofStep>,
}

/// Check that `id` is a leaf under `root` using only the proof.
pub fn verify_proof(id: &AssetId, proof: &MerkleProof, root: &Hash) -> bool {
  let mut acc = leaf_hash(id);
  for step in &proof.steps {
    let mut sibling = [0u8; 32];
    if hex::decode_to_slice(&step.hash, &mut sibling).is_err() {
      return false;
    }
    acc = match step.side {
      Side::Left => node_hash(&sibling, &acc),
      Side::Right => node_hash(&acc, &sibling),
    };
  }
  &acc == root
}

/// Parse a hex root as stored on a snapshot.
pub fn parse_root(hex_root: &str) -> Result<Hash> {
  let mut out = [0u8; 32];
  hex::decode_to_slice(hex_root, &mut out)
    .map_err(|e| Error::InvalidInput(format!("invalid merkle root {hex_root:?}: {e}")))?;
  Ok(out)
}

// ─── Tree ────────────────────────────────────────────────────────────────────

/// Every level of the tree, leaves first. The last level holds the root.
#[derive(Debug, Clone)]
pub struct MerkleTree {
  ids:    Vec<AssetId>,
  levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
  /// Leaves are taken in the given order; duplicates are kept as-is.
  pub fn build(ids: &[AssetId]) -> Self {
    let leaves: Vec<Hash> = ids.iter().map(leaf_hash).collect();
    let mut levels = vec![leaves];
    while let Some(level) = levels.last()
      && level.len() > 1
    {
      let next = level
        .chunks(2)
        .map(|pair| node_hash(&pair[0], pair.get(1).unwrap_or(&pair[0])))
        .collect();
      levels.push(next);
    }
    Self { ids: ids.to_vec(), levels }
  }

  pub fn len(&self) -> usize { self.ids.len() }

  pub fn is_empty(&self) -> bool { self.ids.is_empty() }

  pub fn root(&self) -> Hash {
    match self.levels.last().and_then(|l| l.first()) {
      Some(root) => *root,
      None => Sha256::digest(b"").into(),
    }
  }

  pub fn root_hex(&self) -> String { hex::encode(self.root()) }

  /// Inclusion proof for the first leaf equal to `id`.
  pub fn proof(&self, id: &AssetId) -> Result<MerkleProof> {
    let leaf_index = self
      .ids
      .iter()
      .position(|x| x == id)
      .ok_or_else(|| Error::NotFound(format!("{id} is not a leaf of this tree")))?;

    let mut steps = Vec::with_capacity(self.levels.len().saturating_sub(1));
    let mut index = leaf_index;
    for level in &self.levels[..self.levels.len() - 1] {
      let (sibling, side) = if index % 2 == 0 {
        // Odd tail: the node is its own sibling.
        (level.get(index + 1).unwrap_or(&level[index]), Side::Right)
      } else {
        (&level[index - 1], Side::Left)
      };
      steps.push(ProofStep { hash: hex::encode(sibling), side });
      index /= 2;
    }
    Ok(MerkleProof { leaf_index, steps })
  }
}

#[cfg(test)]
mod tests {
  use aifs_core::HashAlgorithm;

  use super::*;

  fn ids(n: u32) -> Vec<AssetId> {
    (0..n).map(|i| HashAlgorithm::Sha256.content_id(&i.to_le_bytes())).collect()
  }

  #[test]
  fn empty_tree_root_is_hash_of_nothing() {
    let tree = MerkleTree::build(&[]);
    assert_eq!(
      tree.root_hex(),
      "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert!(tree.is_empty());
  }

  #[test]
  fn single_leaf_root_is_leaf_hash() {
    let ids = ids(1);
    let tree = MerkleTree::build(&ids);
    assert_eq!(tree.root(), leaf_hash(&ids[0]));
    let proof = tree.proof(&ids[0]).unwrap();
    assert!(proof.steps.is_empty());
    assert!(verify_proof(&ids[0], &proof, &tree.root()));
  }

  #[test]
  fn odd_level_duplicates_last_node() {
    let ids = ids(3);
    let tree = MerkleTree::build(&ids);
    let (a, b, c) = (leaf_hash(&ids[0]), leaf_hash(&ids[1]), leaf_hash(&ids[2]));
    let expected = node_hash(&node_hash(&a, &b), &node_hash(&c, &c));
    assert_eq!(tree.root(), expected);
  }

  #[test]
  fn every_leaf_proves_for_many_sizes() {
    for n in [1, 2, 3, 4, 5, 7, 8, 9, 16, 33] {
      let ids = ids(n);
      let tree = MerkleTree::build(&ids);
      let root = tree.root();
      for id in &ids {
        let proof = tree.proof(id).unwrap();
        assert!(verify_proof(id, &proof, &root), "n={n}");
      }
    }
  }

  #[test]
  fn flipped_sibling_fails() {
    let ids = ids(6);
    let tree = MerkleTree::build(&ids);
    let mut proof = tree.proof(&ids[4]).unwrap();
    let mut bytes = hex::decode(&proof.steps[1].hash).unwrap();
    bytes[0] ^= 0x01;
    proof.steps[1].hash = hex::encode(bytes);
    assert!(!verify_proof(&ids[4], &proof, &tree.root()));
  }

  #[test]
  fn proof_rejects_other_ids_and_roots() {
    let all = ids(5);
    let tree = MerkleTree::build(&all[..4]);
    let proof = tree.proof(&all[1]).unwrap();
    assert!(!verify_proof(&all[2], &proof, &tree.root()));
    assert!(!verify_proof(&all[1], &proof, &MerkleTree::build(&all).root()));
    assert!(matches!(tree.proof(&all[4]), Err(Error::NotFound(_))));
  }

  #[test]
  fn order_matters() {
    let mut ids = ids(4);
    let before = MerkleTree::build(&ids).root();
    ids.swap(0, 1);
    assert_ne!(before, MerkleTree::build(&ids).root());
  }

  #[test]
  fn parse_root_roundtrips_hex() {
    let tree = MerkleTree::build(&ids(3));
    assert_eq!(parse_root(&tree.root_hex()).unwrap(), tree.root());
    assert!(parse_root("zz").is_err());
  }
}
