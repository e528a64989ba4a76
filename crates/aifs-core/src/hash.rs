//! Content hash algorithms.
//!
//! The algorithm that produced an id is recorded next to every asset and in
//! every on-disk object header, so ids minted under an older default stay
//! verifiable after the deployment switches algorithms.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumString};

use crate::asset::AssetId;

/// A cryptographic hash function usable for content addressing. Both
/// variants produce 32-byte digests.
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
pub enum HashAlgorithm {
  #[default]
  Sha256,
  Blake3,
}

impl HashAlgorithm {
  /// Hash `data` to a 32-byte digest.
  pub fn digest(self, data: &[u8]) -> [u8; 32] {
    match self {
      Self::Sha256 => Sha256::digest(data).into(),
      Self::Blake3 => *blake3::hash(data).as_bytes(),
    }
  }

  /// The content address of `data` under this algorithm.
  pub fn content_id(self, data: &[u8]) -> AssetId {
    AssetId::from_digest(&self.digest(data))
  }

  /// Single-byte code written into object headers.
  pub fn code(self) -> u8 {
    match self {
      Self::Sha256 => 1,
      Self::Blake3 => 2,
    }
  }

  pub fn from_code(code: u8) -> Option<Self> {
    match code {
      1 => Some(Self::Sha256),
      2 => Some(Self::Blake3),
      _ => None,
    }
  }
}
