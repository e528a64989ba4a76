//! Error types for `aifs-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid asset id {0:?}: expected 64 lowercase hex characters")]
  InvalidAssetId(String),

  #[error("unknown hash algorithm: {0:?}")]
  UnknownHashAlgorithm(String),

  #[error("unknown relationship kind: {0:?}")]
  UnknownRelationshipKind(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
